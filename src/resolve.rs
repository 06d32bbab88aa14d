use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast::{
    AssignTok, Block, Decl, ElseBranch, Expr, Field, File, FuncDecl, FuncType, Ident, Stmt,
};
use crate::error::Error;
use crate::parser;

pub const NET_HTTP_PATH: &str = "net/http";
pub const NEWRELIC_AGENT_IMPORT: &str = "github.com/newrelic/go-agent/v3/newrelic";

/// A shallow Go type, enough to answer the questions the transforms ask.
#[derive(Debug, Clone, PartialEq)]
pub enum GoType {
    Named {
        path: Option<String>,
        name: String,
    },
    Ptr(Box<GoType>),
    Unknown,
}

impl GoType {
    pub fn named(path: &str, name: &str) -> GoType {
        GoType::Named {
            path: Some(path.to_string()),
            name: name.to_string(),
        }
    }

    pub fn local(name: &str) -> GoType {
        GoType::Named {
            path: None,
            name: name.to_string(),
        }
    }

    pub fn ptr(inner: GoType) -> GoType {
        GoType::Ptr(Box::new(inner))
    }

    /// The named `error` type: no package, name `error`.
    pub fn error() -> GoType {
        GoType::local("error")
    }

    pub fn is_error(&self) -> bool {
        matches!(self, GoType::Named { path: None, name } if name == "error")
    }

    /// Strip pointer indirection.
    pub fn base(&self) -> &GoType {
        match self {
            GoType::Ptr(inner) => inner.base(),
            other => other,
        }
    }
}

/// One loaded Go package: its import path, declared name, and parsed files.
#[derive(Debug, Clone)]
pub struct Package {
    pub path: String,
    pub name: String,
    pub files: Vec<File>,
}

/// Load every package under `root`: walk for `.go` files (skipping `vendor/`,
/// `testdata/`, hidden directories, and `_test.go` files), parse them, and
/// rewrite import-alias selectors into path-qualified identifiers.
///
/// The package path is the module path from `go.mod` joined with the
/// directory relative to the root; without a `go.mod` the directory name is
/// used.
pub fn load_project(root: &Path) -> Result<Vec<Package>, Error> {
    let module = module_path(root);

    let mut dirs = Vec::new();
    collect_go_dirs(root, &mut dirs)?;
    dirs.sort();

    let mut packages = Vec::new();
    for dir in dirs {
        let mut go_files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                let name = path.file_name()?.to_str()?.to_string();
                if path.is_file() && name.ends_with(".go") && !name.ends_with("_test.go") {
                    Some(path)
                } else {
                    None
                }
            })
            .collect();
        go_files.sort();
        if go_files.is_empty() {
            continue;
        }

        let rel = dir.strip_prefix(root).unwrap_or(&dir);
        let pkg_path = if rel.as_os_str().is_empty() {
            module.clone()
        } else {
            format!("{module}/{}", rel.to_string_lossy().replace('\\', "/"))
        };

        let mut files = Vec::new();
        for path in &go_files {
            let source = std::fs::read_to_string(path).map_err(|source| Error::ReadError {
                path: path.clone(),
                source,
            })?;
            let rel_file = path.strip_prefix(root).unwrap_or(path);
            let mut file = parser::parse_file(rel_file, &source).map_err(|source| Error::Parse {
                path: path.clone(),
                source,
            })?;
            qualify_file(&mut file);
            files.push(file);
        }

        let name = files[0].package.clone();
        packages.push(Package {
            path: pkg_path,
            name,
            files,
        });
    }

    if packages.is_empty() {
        return Err(Error::NoGoFiles(root.to_path_buf()));
    }
    Ok(packages)
}

fn collect_go_dirs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), Error> {
    out.push(dir.to_path_buf());
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name == "vendor" || name == "testdata" {
            continue;
        }
        collect_go_dirs(&path, out)?;
    }
    Ok(())
}

/// Read the module path out of `go.mod`, falling back to the directory name.
fn module_path(root: &Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(root.join("go.mod")) {
        for line in contents.lines() {
            if let Some(rest) = line.trim().strip_prefix("module ") {
                return rest.trim().to_string();
            }
        }
    }
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string())
}

// Qualification pass
//////////////////////////////////////////////

/// Rewrite `alias.Name` selectors into path-qualified identifiers wherever
/// `alias` is an import alias that is not shadowed by a local binding. This is
/// the decorate step: after it, every reference into another package carries
/// its import path, and the printer restores aliases on emission.
pub fn qualify_file(file: &mut File) {
    let mut aliases = HashMap::new();
    for spec in &file.imports {
        let alias = spec
            .alias
            .clone()
            .unwrap_or_else(|| spec.path.rsplit('/').next().unwrap_or(&spec.path).to_string());
        aliases.insert(alias, spec.path.clone());
    }
    if aliases.is_empty() {
        return;
    }

    let mut q = Qualifier {
        aliases,
        scopes: vec![],
    };
    for decl in &mut file.decls {
        match decl {
            Decl::Func(f) => q.func_decl(f),
            Decl::Var(v) | Decl::Const(v) => {
                if let Some(ty) = &mut v.ty {
                    q.expr(ty);
                }
                for e in &mut v.values {
                    q.expr(e);
                }
            }
            Decl::Type(t) => q.expr(&mut t.ty),
        }
    }
}

struct Qualifier {
    aliases: HashMap<String, String>,
    scopes: Vec<Vec<String>>,
}

impl Qualifier {
    fn in_scope(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.iter().any(|n| n == name))
    }

    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_string());
        }
    }

    fn func_decl(&mut self, f: &mut FuncDecl) {
        self.scopes.push(vec![]);
        if let Some(recv) = &mut f.recv {
            self.expr(&mut recv.ty);
            let names = recv.names.clone();
            for n in &names {
                self.bind(n);
            }
        }
        self.signature(&mut f.ty);
        self.block(&mut f.body);
        self.scopes.pop();
    }

    fn signature(&mut self, ty: &mut FuncType) {
        for field in ty.params.iter_mut().chain(ty.results.iter_mut()) {
            self.expr(&mut field.ty);
        }
        for field in ty.params.iter().chain(ty.results.iter()) {
            let names = field.names.clone();
            for n in &names {
                self.bind(n);
            }
        }
    }

    fn block(&mut self, block: &mut Block) {
        self.scopes.push(vec![]);
        for stmt in &mut block.stmts {
            self.stmt(stmt);
        }
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Assign(s) => {
                for e in &mut s.rhs {
                    self.expr(e);
                }
                for e in &mut s.lhs {
                    self.expr(e);
                }
                if s.tok == AssignTok::Define {
                    let names: Vec<String> = s
                        .lhs
                        .iter()
                        .filter_map(|e| e.as_bare_ident().map(str::to_string))
                        .collect();
                    for name in &names {
                        self.bind(name);
                    }
                }
            }
            Stmt::Expr(s) => self.expr(&mut s.x),
            Stmt::If(s) => self.if_stmt(s),
            Stmt::For(s) => {
                self.scopes.push(vec![]);
                if let Some(init) = &mut s.init {
                    self.stmt(init);
                }
                if let Some(cond) = &mut s.cond {
                    self.expr(cond);
                }
                if let Some(post) = &mut s.post {
                    self.stmt(post);
                }
                self.block(&mut s.body);
                self.scopes.pop();
            }
            Stmt::Range(s) => {
                self.scopes.push(vec![]);
                self.expr(&mut s.x);
                if s.tok == AssignTok::Define {
                    let names: Vec<String> = s
                        .key
                        .iter()
                        .chain(s.value.iter())
                        .filter_map(|e| e.as_bare_ident().map(str::to_string))
                        .collect();
                    for name in &names {
                        self.bind(name);
                    }
                }
                self.block(&mut s.body);
                self.scopes.pop();
            }
            Stmt::Return(s) => {
                for e in &mut s.results {
                    self.expr(e);
                }
            }
            Stmt::Defer(s) => self.expr(&mut s.call),
            Stmt::Go(s) => self.expr(&mut s.call),
            Stmt::IncDec(s) => self.expr(&mut s.x),
            Stmt::Var(s) => {
                if let Some(ty) = &mut s.ty {
                    self.expr(ty);
                }
                for e in &mut s.values {
                    self.expr(e);
                }
                let names = s.names.clone();
                for n in &names {
                    self.bind(n);
                }
            }
            Stmt::Type(s) => self.expr(&mut s.ty),
            Stmt::Branch(_) => {}
            Stmt::Block(b, _) => self.block(b),
        }
    }

    fn if_stmt(&mut self, s: &mut crate::ast::IfStmt) {
        self.scopes.push(vec![]);
        if let Some(init) = &mut s.init {
            self.stmt(init);
        }
        self.expr(&mut s.cond);
        self.block(&mut s.body);
        match &mut s.els {
            Some(ElseBranch::If(next)) => self.if_stmt(next),
            Some(ElseBranch::Block(b)) => self.block(b),
            None => {}
        }
        self.scopes.pop();
    }

    fn expr(&mut self, e: &mut Expr) {
        // Rewrite the selector itself first, then descend.
        if let Expr::Selector { x, sel } = e
            && let Some(alias) = x.as_bare_ident()
            && !self.in_scope(alias)
            && let Some(path) = self.aliases.get(alias).cloned()
        {
            *e = Expr::Ident(Ident {
                name: sel.clone(),
                path: Some(path),
            });
            return;
        }
        match e {
            Expr::Selector { x, .. } => self.expr(x),
            Expr::Call(c) => {
                self.expr(&mut c.fun);
                for a in &mut c.args {
                    self.expr(a);
                }
            }
            Expr::CompositeLit { ty, elts, .. } => {
                if let Some(ty) = ty {
                    self.expr(ty);
                }
                for e in elts {
                    self.expr(e);
                }
            }
            Expr::KeyValue { value, .. } => {
                // Keys in composite literals are field names, not references.
                self.expr(value);
            }
            Expr::Unary { x, .. } | Expr::Star(x) | Expr::Paren(x) => self.expr(x),
            Expr::Binary { x, y, .. } => {
                self.expr(x);
                self.expr(y);
            }
            Expr::Index { x, index } => {
                self.expr(x);
                self.expr(index);
            }
            Expr::Slice { x, low, high } => {
                self.expr(x);
                if let Some(low) = low {
                    self.expr(low);
                }
                if let Some(high) = high {
                    self.expr(high);
                }
            }
            Expr::ArrayType { len, elt } => {
                if let Some(len) = len {
                    self.expr(len);
                }
                self.expr(elt);
            }
            Expr::MapType { key, value } => {
                self.expr(key);
                self.expr(value);
            }
            Expr::StructType { fields } => {
                for f in fields {
                    self.expr(&mut f.ty);
                }
            }
            Expr::FuncType(ty) => {
                self.scopes.push(vec![]);
                self.signature(ty);
                self.scopes.pop();
            }
            Expr::FuncLit(lit) => {
                self.scopes.push(vec![]);
                self.signature(&mut lit.ty);
                self.block(&mut lit.body);
                self.scopes.pop();
            }
            Expr::Ident(_) | Expr::BasicLit { .. } => {}
        }
    }
}

// Type resolution
//////////////////////////////////////////////

/// Answers type questions over the loaded package set: user function result
/// tuples, standard-library signatures the transforms care about, and
/// expression typing against a function body's local bindings.
pub struct Resolver {
    user_results: HashMap<(String, String), Vec<GoType>>,
}

/// Local bindings of one function body: variable types and locally declared
/// struct types, collected in statement order.
#[derive(Debug, Default)]
pub struct BodyTypes {
    vars: HashMap<String, GoType>,
    structs: HashMap<String, HashMap<String, GoType>>,
}

impl Resolver {
    pub fn new(packages: &[Package]) -> Resolver {
        let mut user_results = HashMap::new();
        for pkg in packages {
            for file in &pkg.files {
                for decl in &file.decls {
                    if let Decl::Func(f) = decl
                        && f.recv.is_none()
                    {
                        let results: Vec<GoType> = f
                            .ty
                            .results
                            .iter()
                            .flat_map(|field| {
                                let ty = type_expr_to_gotype(&field.ty);
                                let copies = field.names.len().max(1);
                                std::iter::repeat_n(ty, copies)
                            })
                            .collect();
                        user_results.insert((pkg.path.clone(), f.name.clone()), results);
                    }
                }
            }
        }
        Resolver { user_results }
    }

    /// Collect local variable and struct types for a function body, visible
    /// to every statement in that body (collection is flow-ordered, so later
    /// redefinitions win).
    pub fn body_types(&self, decl: &FuncDecl, pkg_path: &str) -> BodyTypes {
        let mut bt = BodyTypes::default();
        if let Some(recv) = &decl.recv {
            let ty = type_expr_to_gotype(&recv.ty);
            for n in &recv.names {
                bt.vars.insert(n.clone(), ty.clone());
            }
        }
        for field in decl.ty.params.iter().chain(decl.ty.results.iter()) {
            let ty = type_expr_to_gotype(&field.ty);
            for n in &field.names {
                bt.vars.insert(n.clone(), ty.clone());
            }
        }
        self.collect_block(&decl.body, pkg_path, &mut bt);
        bt
    }

    /// Same collection for a function literal's body, seeded from the
    /// enclosing scope's bindings.
    pub fn literal_types(
        &self,
        lit: &crate::ast::FuncLit,
        outer: &BodyTypes,
        pkg_path: &str,
    ) -> BodyTypes {
        let mut bt = BodyTypes {
            vars: outer.vars.clone(),
            structs: outer.structs.clone(),
        };
        for field in lit.ty.params.iter() {
            let ty = type_expr_to_gotype(&field.ty);
            for n in &field.names {
                bt.vars.insert(n.clone(), ty.clone());
            }
        }
        self.collect_block(&lit.body, pkg_path, &mut bt);
        bt
    }

    fn collect_block(&self, block: &Block, pkg_path: &str, bt: &mut BodyTypes) {
        for stmt in &block.stmts {
            self.collect_stmt(stmt, pkg_path, bt);
        }
    }

    fn collect_stmt(&self, stmt: &Stmt, pkg_path: &str, bt: &mut BodyTypes) {
        match stmt {
            Stmt::Type(t) => {
                if let Expr::StructType { fields } = &t.ty {
                    let mut field_types = HashMap::new();
                    for Field { names, ty } in fields {
                        let ty = type_expr_to_gotype(ty);
                        for n in names {
                            field_types.insert(n.clone(), ty.clone());
                        }
                    }
                    bt.structs.insert(t.name.clone(), field_types);
                }
            }
            Stmt::Var(v) => {
                if let Some(ty) = &v.ty {
                    let ty = type_expr_to_gotype(ty);
                    for n in &v.names {
                        bt.vars.insert(n.clone(), ty.clone());
                    }
                } else if v.values.len() == v.names.len() {
                    for (n, e) in v.names.iter().zip(&v.values) {
                        if let Some(ty) = self.type_of(e, bt, pkg_path) {
                            bt.vars.insert(n.clone(), ty);
                        }
                    }
                }
            }
            Stmt::Assign(s) if s.tok == AssignTok::Define => {
                self.collect_define(&s.lhs, &s.rhs, pkg_path, bt);
            }
            Stmt::If(s) => self.collect_if(s, pkg_path, bt),
            Stmt::For(s) => {
                if let Some(init) = &s.init {
                    self.collect_stmt(init, pkg_path, bt);
                }
                self.collect_block(&s.body, pkg_path, bt);
            }
            Stmt::Range(s) => self.collect_block(&s.body, pkg_path, bt),
            Stmt::Block(b, _) => self.collect_block(b, pkg_path, bt),
            _ => {}
        }
    }

    fn collect_if(&self, s: &crate::ast::IfStmt, pkg_path: &str, bt: &mut BodyTypes) {
        if let Some(init) = &s.init {
            self.collect_stmt(init, pkg_path, bt);
        }
        self.collect_block(&s.body, pkg_path, bt);
        match &s.els {
            Some(ElseBranch::If(next)) => self.collect_if(next, pkg_path, bt),
            Some(ElseBranch::Block(b)) => self.collect_block(b, pkg_path, bt),
            None => {}
        }
    }

    fn collect_define(&self, lhs: &[Expr], rhs: &[Expr], pkg_path: &str, bt: &mut BodyTypes) {
        if rhs.len() == 1 && lhs.len() > 1 {
            // Multi-value call: distribute the result tuple positionally.
            if let Expr::Call(call) = &rhs[0]
                && let Some(results) = self.call_results(call, bt, pkg_path)
            {
                let bindings: Vec<(String, GoType)> = lhs
                    .iter()
                    .zip(results)
                    .filter_map(|(e, ty)| e.as_bare_ident().map(|n| (n.to_string(), ty)))
                    .collect();
                for (name, ty) in bindings {
                    bt.vars.insert(name, ty);
                }
            }
            return;
        }
        for (e, value) in lhs.iter().zip(rhs) {
            let Some(name) = e.as_bare_ident().map(str::to_string) else {
                continue;
            };
            if let Some(ty) = self.type_of(value, bt, pkg_path) {
                bt.vars.insert(name, ty);
            }
        }
    }

    /// The result tuple of a call expression, if the callee is recognized.
    pub fn call_results(
        &self,
        call: &crate::ast::CallExpr,
        bt: &BodyTypes,
        pkg_path: &str,
    ) -> Option<Vec<GoType>> {
        match &*call.fun {
            Expr::Ident(Ident { name, path: None }) => self
                .user_results
                .get(&(pkg_path.to_string(), name.clone()))
                .cloned(),
            Expr::Ident(Ident {
                name,
                path: Some(path),
            }) => stdlib_results(path, name).or_else(|| {
                self.user_results
                    .get(&(path.clone(), name.clone()))
                    .cloned()
            }),
            Expr::Selector { x, sel } => {
                let recv = self.type_of(x, bt, pkg_path)?;
                method_results(recv.base(), sel)
            }
            _ => None,
        }
    }

    /// Index of the first `error` in the call's result tuple.
    pub fn error_return_index(
        &self,
        call: &crate::ast::CallExpr,
        bt: &BodyTypes,
        pkg_path: &str,
    ) -> Option<usize> {
        self.call_results(call, bt, pkg_path)?
            .iter()
            .position(GoType::is_error)
    }

    /// Shallow typing of an expression against the body's local bindings.
    pub fn type_of(&self, e: &Expr, bt: &BodyTypes, pkg_path: &str) -> Option<GoType> {
        match e {
            Expr::Ident(Ident { name, path: None }) => bt.vars.get(name).cloned(),
            Expr::Ident(Ident {
                name,
                path: Some(path),
            }) => stdlib_var(path, name),
            Expr::Selector { x, sel } => {
                let base = self.type_of(x, bt, pkg_path)?;
                match base.base() {
                    GoType::Named { path: None, name } => bt.structs.get(name)?.get(sel).cloned(),
                    _ => None,
                }
            }
            Expr::Unary { op, x } if op == "&" => Some(GoType::ptr(self.type_of(x, bt, pkg_path)?)),
            Expr::CompositeLit { ty: Some(ty), .. } => Some(type_expr_to_gotype(ty)),
            Expr::Call(call) => self
                .call_results(call, bt, pkg_path)
                .and_then(|r| r.into_iter().next()),
            Expr::Paren(x) => self.type_of(x, bt, pkg_path),
            _ => None,
        }
    }

    /// The name of the `net/http` method invoked by this call (`Get`, `Do`,
    /// `HandleFunc`, ...), whether package-level or through a client value.
    pub fn net_http_method(
        &self,
        call: &crate::ast::CallExpr,
        bt: &BodyTypes,
        pkg_path: &str,
    ) -> Option<String> {
        match &*call.fun {
            Expr::Ident(Ident {
                name,
                path: Some(path),
            }) if path == NET_HTTP_PATH => Some(name.clone()),
            Expr::Selector { x, sel } => {
                let recv = self.type_of(x, bt, pkg_path)?;
                let is_http_type = matches!(
                    recv.base(),
                    GoType::Named { path: Some(p), .. } if p == NET_HTTP_PATH
                );
                if is_http_type && method_results(recv.base(), sel).is_some() {
                    Some(sel.clone())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// If the call goes through a package-level `net/http` variable (the
    /// `DefaultClient` case), the name of that variable.
    pub fn net_http_package_client(&self, call: &crate::ast::CallExpr) -> Option<String> {
        if let Expr::Selector { x, .. } = &*call.fun
            && let Expr::Ident(Ident {
                name,
                path: Some(path),
            }) = &**x
            && path == NET_HTTP_PATH
        {
            return Some(name.clone());
        }
        None
    }

    /// The left-hand-side expression bound to a `*net/http.Response` in this
    /// statement, if any.
    pub fn response_expr<'a>(
        &self,
        stmt: &'a Stmt,
        bt: &BodyTypes,
        pkg_path: &str,
    ) -> Option<&'a Expr> {
        let Stmt::Assign(assign) = stmt else {
            return None;
        };
        assign.lhs.iter().find(|e| {
            match self.type_of(e, bt, pkg_path) {
                Some(ty) => matches!(
                    ty.base(),
                    GoType::Named { path: Some(p), name } if p == NET_HTTP_PATH && name == "Response"
                ) && matches!(ty, GoType::Ptr(_)),
                None => false,
            }
        })
    }

    /// An HTTP handler declaration: exactly two parameters typed
    /// `http.ResponseWriter` and `*http.Request`.
    pub fn is_http_handler(&self, decl: &FuncDecl) -> bool {
        let params = &decl.ty.params;
        if params.len() != 2 {
            return false;
        }
        let (mut rw, mut req) = (false, false);
        for param in params {
            match &param.ty {
                Expr::Ident(Ident {
                    name,
                    path: Some(path),
                }) if path == NET_HTTP_PATH && name == "ResponseWriter" => rw = true,
                Expr::Star(inner) => {
                    if let Expr::Ident(Ident {
                        name,
                        path: Some(path),
                    }) = &**inner
                        && path == NET_HTTP_PATH
                        && name == "Request"
                    {
                        req = true;
                    }
                }
                _ => {}
            }
        }
        rw && req
    }
}

/// Convert a type expression (post-qualification) to a shallow `GoType`.
pub fn type_expr_to_gotype(e: &Expr) -> GoType {
    match e {
        Expr::Ident(Ident { name, path }) => GoType::Named {
            path: path.clone(),
            name: name.clone(),
        },
        Expr::Star(inner) => GoType::ptr(type_expr_to_gotype(inner)),
        Expr::Paren(inner) => type_expr_to_gotype(inner),
        Expr::Selector { sel, .. } => {
            // Unqualified selector type (alias was shadowed); best effort.
            GoType::Named {
                path: None,
                name: sel.clone(),
            }
        }
        _ => GoType::Unknown,
    }
}

/// Result tuples of the package-level standard-library functions the
/// transforms inspect.
fn stdlib_results(path: &str, name: &str) -> Option<Vec<GoType>> {
    let response = || GoType::ptr(GoType::named(NET_HTTP_PATH, "Response"));
    match (path, name) {
        (NET_HTTP_PATH, "Get" | "Post" | "Head" | "PostForm") => {
            Some(vec![response(), GoType::error()])
        }
        (NET_HTTP_PATH, "NewRequest") => Some(vec![
            GoType::ptr(GoType::named(NET_HTTP_PATH, "Request")),
            GoType::error(),
        ]),
        (NET_HTTP_PATH, "NewServeMux") => {
            Some(vec![GoType::ptr(GoType::named(NET_HTTP_PATH, "ServeMux"))])
        }
        (NET_HTTP_PATH, "ListenAndServe") => Some(vec![GoType::error()]),
        ("errors", "New") => Some(vec![GoType::error()]),
        ("io", "WriteString") => Some(vec![GoType::local("int"), GoType::error()]),
        ("io", "Copy") => Some(vec![GoType::local("int64"), GoType::error()]),
        ("time", "Sleep") => Some(vec![]),
        _ => None,
    }
}

/// Package-level standard-library variables.
fn stdlib_var(path: &str, name: &str) -> Option<GoType> {
    match (path, name) {
        (NET_HTTP_PATH, "DefaultClient") => {
            Some(GoType::ptr(GoType::named(NET_HTTP_PATH, "Client")))
        }
        _ => None,
    }
}

/// Result tuples of the standard-library methods the transforms inspect,
/// keyed by (receiver base type, method name).
fn method_results(recv: &GoType, method: &str) -> Option<Vec<GoType>> {
    let GoType::Named {
        path: Some(path),
        name,
    } = recv
    else {
        return None;
    };
    if path != NET_HTTP_PATH {
        return None;
    }
    let response = || GoType::ptr(GoType::named(NET_HTTP_PATH, "Response"));
    match (name.as_str(), method) {
        ("Client", "Do") => Some(vec![response(), GoType::error()]),
        ("Client", "Get" | "Post" | "Head" | "PostForm") => Some(vec![response(), GoType::error()]),
        ("ServeMux", "Handle" | "HandleFunc") => Some(vec![]),
        ("ResponseWriter", "Write") => Some(vec![GoType::local("int"), GoType::error()]),
        ("Request", "Context") => Some(vec![GoType::named("context", "Context")]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn qualified(src: &str) -> File {
        let mut file = parse_source("test.go", src).expect("fixture should parse");
        qualify_file(&mut file);
        file
    }

    fn one_package(file: &File) -> Vec<Package> {
        vec![Package {
            path: "example".into(),
            name: "main".into(),
            files: vec![file.clone()],
        }]
    }

    fn func_named<'a>(file: &'a File, name: &str) -> &'a FuncDecl {
        for d in &file.decls {
            if let Decl::Func(f) = d
                && f.name == name
            {
                return f;
            }
        }
        panic!("no function {name} in fixture");
    }

    fn call_at<'a>(f: &'a FuncDecl, idx: usize) -> &'a crate::ast::CallExpr {
        match &f.body.stmts[idx] {
            Stmt::Expr(e) => match &e.x {
                Expr::Call(c) => c,
                _ => panic!("statement {idx} is not a call"),
            },
            Stmt::Assign(a) => match &a.rhs[0] {
                Expr::Call(c) => c,
                _ => panic!("statement {idx} rhs is not a call"),
            },
            other => panic!("statement {idx} is not a call statement: {other:?}"),
        }
    }

    #[test]
    fn qualify_rewrites_import_selectors() {
        let file = qualified(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\thttp.Get(\"http://example.com\")\n}\n",
        );
        let f = func_named(&file, "main");
        let call = call_at(f, 0);
        assert_eq!(
            *call.fun,
            Expr::qualified("Get", NET_HTTP_PATH),
            "selector over import alias should become a qualified ident"
        );
    }

    #[test]
    fn qualify_respects_shadowing() {
        let file = qualified(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\thttp := newFake()\n\thttp.Get(\"x\")\n}\n",
        );
        let f = func_named(&file, "main");
        let call = call_at(f, 1);
        assert!(
            matches!(*call.fun, Expr::Selector { .. }),
            "shadowed alias must stay a selector"
        );
    }

    #[test]
    fn handler_detection_requires_both_params() {
        let file = qualified(
            "package main\n\nimport (\n\t\"io\"\n\t\"net/http\"\n)\n\nfunc index(w http.ResponseWriter, r *http.Request) {\n\tio.WriteString(w, \"ok\")\n}\n\nfunc other(w http.ResponseWriter, r *http.Request, x string) {\n\tio.WriteString(w, x)\n}\n",
        );
        let resolver = Resolver::new(&one_package(&file));
        assert!(resolver.is_http_handler(func_named(&file, "index")));
        assert!(!resolver.is_http_handler(func_named(&file, "other")));
    }

    #[test]
    fn error_index_of_known_stdlib_call() {
        let file = qualified(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\t_, err := http.Get(\"http://example.com\")\n\t_ = err\n}\n",
        );
        let resolver = Resolver::new(&one_package(&file));
        let f = func_named(&file, "main");
        let bt = resolver.body_types(f, "example");
        assert_eq!(
            resolver.error_return_index(call_at(f, 0), &bt, "example"),
            Some(1)
        );
    }

    #[test]
    fn user_function_results_are_indexed() {
        let file = qualified(
            "package main\n\nfunc helper(url string) error {\n\treturn nil\n}\n\nfunc main() {\n\terr := helper(\"x\")\n\t_ = err\n}\n",
        );
        let resolver = Resolver::new(&one_package(&file));
        let f = func_named(&file, "main");
        let bt = resolver.body_types(f, "example");
        assert_eq!(
            resolver.error_return_index(call_at(f, 0), &bt, "example"),
            Some(0)
        );
    }

    #[test]
    fn local_client_resolves_do_method() {
        let file = qualified(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\tclient := &http.Client{}\n\treq, _ := http.NewRequest(\"GET\", \"http://example.com\", nil)\n\tclient.Do(req)\n}\n",
        );
        let resolver = Resolver::new(&one_package(&file));
        let f = func_named(&file, "main");
        let bt = resolver.body_types(f, "example");
        let call = call_at(f, 2);
        assert_eq!(
            resolver.net_http_method(call, &bt, "example"),
            Some("Do".to_string())
        );
        assert_eq!(resolver.net_http_package_client(call), None);
    }

    #[test]
    fn default_client_is_recognized() {
        let file = qualified(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\treq, _ := http.NewRequest(\"GET\", \"http://example.com\", nil)\n\thttp.DefaultClient.Do(req)\n}\n",
        );
        let resolver = Resolver::new(&one_package(&file));
        let f = func_named(&file, "main");
        let bt = resolver.body_types(f, "example");
        let call = call_at(f, 1);
        assert_eq!(
            resolver.net_http_method(call, &bt, "example"),
            Some("Do".to_string())
        );
        assert_eq!(
            resolver.net_http_package_client(call),
            Some("DefaultClient".to_string())
        );
    }

    #[test]
    fn client_get_is_a_method_not_a_package_call() {
        let file = qualified(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\tclient := &http.Client{}\n\tclient.Get(\"https://example.com\")\n}\n",
        );
        let resolver = Resolver::new(&one_package(&file));
        let f = func_named(&file, "main");
        let bt = resolver.body_types(f, "example");
        let call = call_at(f, 1);
        assert_eq!(
            resolver.net_http_method(call, &bt, "example"),
            Some("Get".to_string())
        );
        assert_eq!(
            resolver.net_http_package_client(call),
            None,
            "client.Get goes through a local variable, not the package"
        );
    }

    #[test]
    fn struct_field_typing_resolves_nested_clients() {
        let file = qualified(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\ttype clientInfo struct {\n\t\tclient *http.Client\n\t}\n\tinfo := clientInfo{}\n\treq, _ := http.NewRequest(\"GET\", \"http://example.com\", nil)\n\tinfo.client.Do(req)\n}\n",
        );
        let resolver = Resolver::new(&one_package(&file));
        let f = func_named(&file, "main");
        let bt = resolver.body_types(f, "example");
        let call = call_at(f, 3);
        assert_eq!(
            resolver.net_http_method(call, &bt, "example"),
            Some("Do".to_string()),
            "field access through a local struct should type as *http.Client"
        );
    }

    #[test]
    fn response_binding_is_found() {
        let file = qualified(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\treq, _ := http.NewRequest(\"GET\", \"http://example.com\", nil)\n\tresp, _ := http.DefaultClient.Do(req)\n\t_ = resp\n}\n",
        );
        let resolver = Resolver::new(&one_package(&file));
        let f = func_named(&file, "main");
        let bt = resolver.body_types(f, "example");
        let found = resolver.response_expr(&f.body.stmts[1], &bt, "example");
        assert_eq!(
            found.and_then(|e| e.as_bare_ident()),
            Some("resp"),
            "resp should be typed *net/http.Response"
        );
    }

    #[test]
    fn module_path_prefers_go_mod() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("go.mod"),
            "module example.com/demo\n\ngo 1.21\n",
        )
        .unwrap();
        assert_eq!(module_path(dir.path()), "example.com/demo");
    }

    #[test]
    fn load_project_skips_tests_and_vendor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module demo\n").unwrap();
        std::fs::write(
            dir.path().join("main.go"),
            "package main\n\nfunc main() {\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("main_test.go"),
            "package main\n\nfunc TestMain() {\n}\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("vendor/dep")).unwrap();
        std::fs::write(
            dir.path().join("vendor/dep/dep.go"),
            "package dep\n\nfunc Dep() {\n}\n",
        )
        .unwrap();

        let packages = load_project(dir.path()).unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].path, "demo");
        assert_eq!(packages[0].files.len(), 1, "test file should be skipped");
    }
}
