use std::collections::{BTreeSet, HashMap};

use crate::ast::{
    AssignTok, Block, Decl, Decorations, ElseBranch, Expr, Field, File, FuncDecl, FuncType,
    IfStmt, Space, Stmt,
};

/// Render a decorated file back to gofmt-style source text.
///
/// Qualified identifiers are printed under their package alias and every
/// referenced import path is merged into the file's import set, grouped into
/// standard-library and external blocks.
pub fn print_file(file: &File) -> String {
    let imports = merged_imports(file);
    let aliases = alias_table(file, &imports);
    let p = Printer { aliases };

    let mut out = String::new();
    for c in &file.header {
        out.push_str(c);
        out.push('\n');
    }
    out.push_str(&format!("package {}\n", file.package));

    if !imports.is_empty() {
        out.push('\n');
        out.push_str(&p.import_block(file, &imports));
    }

    for decl in &file.decls {
        out.push('\n');
        out.push_str(&p.decl(decl));
    }
    out
}

/// Union of the file's declared imports and every package path referenced by
/// a qualified identifier in its tree.
fn merged_imports(file: &File) -> BTreeSet<String> {
    let mut paths: BTreeSet<String> = file.imports.iter().map(|i| i.path.clone()).collect();
    collect_paths_in_file(file, &mut paths);
    paths
}

fn alias_table(file: &File, imports: &BTreeSet<String>) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    for path in imports {
        aliases.insert(path.clone(), default_alias(path).to_string());
    }
    for spec in &file.imports {
        if let Some(alias) = &spec.alias {
            aliases.insert(spec.path.clone(), alias.clone());
        }
    }
    aliases
}

fn default_alias(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_stdlib(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or(path);
    !first.contains('.')
}

struct Printer {
    aliases: HashMap<String, String>,
}

impl Printer {
    fn import_block(&self, file: &File, imports: &BTreeSet<String>) -> String {
        let spec_text = |path: &str| -> String {
            let declared = file
                .imports
                .iter()
                .find(|i| i.path == path)
                .and_then(|i| i.alias.as_deref());
            match declared {
                Some(alias) => format!("{alias} \"{path}\""),
                None => format!("\"{path}\""),
            }
        };

        if imports.len() == 1 {
            let path = imports.iter().next().expect("len checked");
            return format!("import {}\n", spec_text(path));
        }

        let std_group: Vec<&String> = imports.iter().filter(|p| is_stdlib(p)).collect();
        let ext_group: Vec<&String> = imports.iter().filter(|p| !is_stdlib(p)).collect();

        let mut out = String::from("import (\n");
        for path in &std_group {
            out.push_str(&format!("\t{}\n", spec_text(path)));
        }
        if !std_group.is_empty() && !ext_group.is_empty() {
            out.push('\n');
        }
        for path in &ext_group {
            out.push_str(&format!("\t{}\n", spec_text(path)));
        }
        out.push_str(")\n");
        out
    }

    fn decl(&self, decl: &Decl) -> String {
        let (decs, body) = match decl {
            Decl::Func(f) => (&f.decs, self.func_decl(f)),
            Decl::Var(v) => (&v.decs, format!("{}\n", self.var_text("var", v))),
            Decl::Const(v) => (&v.decs, format!("{}\n", self.var_text("const", v))),
            Decl::Type(t) => (&t.decs, format!("{}\n", self.type_def_text(t, 0))),
        };
        let mut out = String::new();
        for c in &decs.start {
            out.push_str(c);
            out.push('\n');
        }
        out.push_str(&body);
        out
    }

    fn func_decl(&self, f: &FuncDecl) -> String {
        let mut head = String::from("func ");
        if let Some(recv) = &f.recv {
            head.push_str(&format!("({}) ", self.field_text(recv)));
        }
        head.push_str(&f.name);
        head.push_str(&self.func_signature(&f.ty));
        if f.body.stmts.is_empty() && f.body.tail_comments.is_empty() {
            return format!("{head} {{\n}}\n");
        }
        format!("{head} {{\n{}}}\n", self.block_body(&f.body, 1))
    }

    fn func_signature(&self, ty: &FuncType) -> String {
        let params: Vec<String> = ty.params.iter().map(|p| self.field_text(p)).collect();
        let mut out = format!("({})", params.join(", "));
        match ty.results.len() {
            0 => {}
            1 if ty.results[0].names.is_empty() => {
                out.push(' ');
                out.push_str(&self.expr(&ty.results[0].ty, 0));
            }
            _ => {
                let results: Vec<String> = ty.results.iter().map(|r| self.field_text(r)).collect();
                out.push_str(&format!(" ({})", results.join(", ")));
            }
        }
        out
    }

    fn field_text(&self, field: &Field) -> String {
        if field.names.is_empty() {
            self.expr(&field.ty, 0)
        } else {
            format!("{} {}", field.names.join(", "), self.expr(&field.ty, 0))
        }
    }

    /// Render the statements of a block, honoring blank-line and comment
    /// decorations. The result is a sequence of `\n`-terminated lines.
    fn block_body(&self, block: &Block, indent: usize) -> String {
        let tabs = "\t".repeat(indent);
        let mut out = String::new();
        let mut prev_after_empty = false;
        for stmt in &block.stmts {
            let decs = stmt.decorations();
            if decs.before == Space::Empty || prev_after_empty {
                out.push('\n');
            }
            for c in &decs.start {
                out.push_str(&format!("{tabs}{c}\n"));
            }
            out.push_str(&self.stmt_body(stmt, indent));
            prev_after_empty = decs.after == Space::Empty;
        }
        for c in &block.tail_comments {
            out.push_str(&format!("{tabs}{c}\n"));
        }
        out
    }

    /// The statement's own lines (no leading comments), trailing comment
    /// appended to the final line.
    fn stmt_body(&self, stmt: &Stmt, indent: usize) -> String {
        let tabs = "\t".repeat(indent);
        let text = match stmt {
            Stmt::Assign(s) => {
                let lhs: Vec<String> = s.lhs.iter().map(|e| self.expr(e, indent)).collect();
                let rhs: Vec<String> = s.rhs.iter().map(|e| self.expr(e, indent)).collect();
                let tok = match &s.tok {
                    AssignTok::Define => ":=",
                    AssignTok::Assign => "=",
                    AssignTok::Compound(op) => op.as_str(),
                };
                format!("{} {} {}", lhs.join(", "), tok, rhs.join(", "))
            }
            Stmt::Expr(s) => self.expr(&s.x, indent),
            Stmt::If(s) => self.if_text(s, indent),
            Stmt::For(s) => {
                let mut head = String::from("for ");
                match (&s.init, &s.cond, &s.post) {
                    (None, None, None) => head.truncate(3),
                    (None, Some(cond), None) => head.push_str(&self.expr(cond, indent)),
                    _ => {
                        let init = s
                            .init
                            .as_ref()
                            .map(|i| self.stmt_text(i))
                            .unwrap_or_default();
                        let cond = s
                            .cond
                            .as_ref()
                            .map(|c| self.expr(c, indent))
                            .unwrap_or_default();
                        let post = s
                            .post
                            .as_ref()
                            .map(|p| self.stmt_text(p))
                            .unwrap_or_default();
                        head.push_str(&format!("{init}; {cond}; {post}"));
                    }
                }
                format!(
                    "{head} {{\n{}{tabs}}}",
                    self.block_body(&s.body, indent + 1)
                )
            }
            Stmt::Range(s) => {
                let mut head = String::from("for ");
                match (&s.key, &s.value) {
                    (Some(k), Some(v)) => {
                        let tok = if s.tok == AssignTok::Define { ":=" } else { "=" };
                        head.push_str(&format!(
                            "{}, {} {} ",
                            self.expr(k, indent),
                            self.expr(v, indent),
                            tok
                        ));
                    }
                    (Some(k), None) => {
                        let tok = if s.tok == AssignTok::Define { ":=" } else { "=" };
                        head.push_str(&format!("{} {} ", self.expr(k, indent), tok));
                    }
                    _ => {}
                }
                head.push_str(&format!("range {}", self.expr(&s.x, indent)));
                format!(
                    "{head} {{\n{}{tabs}}}",
                    self.block_body(&s.body, indent + 1)
                )
            }
            Stmt::Return(s) => {
                if s.results.is_empty() {
                    "return".to_string()
                } else {
                    let results: Vec<String> =
                        s.results.iter().map(|e| self.expr(e, indent)).collect();
                    format!("return {}", results.join(", "))
                }
            }
            Stmt::Defer(s) => format!("defer {}", self.expr(&s.call, indent)),
            Stmt::Go(s) => format!("go {}", self.expr(&s.call, indent)),
            Stmt::IncDec(s) => format!("{}{}", self.expr(&s.x, indent), s.op),
            Stmt::Var(s) => self.var_text("var", s),
            Stmt::Type(s) => self.type_def_text(s, indent),
            Stmt::Branch(s) => match &s.label {
                Some(label) => format!("{} {label}", s.tok),
                None => s.tok.clone(),
            },
            Stmt::Block(b, _) => {
                format!("{{\n{}{tabs}}}", self.block_body(b, indent + 1))
            }
        };
        let end = end_comment(stmt.decorations());
        format!("{tabs}{text}{end}\n")
    }

    /// Single-line rendering of a simple statement, for `if`/`for` clauses.
    fn stmt_text(&self, stmt: &Stmt) -> String {
        self.stmt_body(stmt, 0).trim_end_matches('\n').to_string()
    }

    fn if_text(&self, s: &IfStmt, indent: usize) -> String {
        let tabs = "\t".repeat(indent);
        let mut out = String::from("if ");
        if let Some(init) = &s.init {
            out.push_str(&format!("{}; ", self.stmt_text(init)));
        }
        out.push_str(&self.expr(&s.cond, indent));
        out.push_str(&format!(
            " {{\n{}{tabs}}}",
            self.block_body(&s.body, indent + 1)
        ));
        match &s.els {
            Some(ElseBranch::If(next)) => {
                out.push_str(&format!(" else {}", self.if_text(next, indent)));
            }
            Some(ElseBranch::Block(block)) => {
                out.push_str(&format!(
                    " else {{\n{}{tabs}}}",
                    self.block_body(block, indent + 1)
                ));
            }
            None => {}
        }
        out
    }

    fn var_text(&self, keyword: &str, v: &crate::ast::VarDecl) -> String {
        let mut out = format!("{keyword} {}", v.names.join(", "));
        if let Some(ty) = &v.ty {
            out.push(' ');
            out.push_str(&self.expr(ty, 0));
        }
        if !v.values.is_empty() {
            let values: Vec<String> = v.values.iter().map(|e| self.expr(e, 0)).collect();
            out.push_str(&format!(" = {}", values.join(", ")));
        }
        out
    }

    fn type_def_text(&self, t: &crate::ast::TypeDef, indent: usize) -> String {
        match &t.ty {
            Expr::StructType { fields } if !fields.is_empty() => {
                let tabs = "\t".repeat(indent);
                let inner = "\t".repeat(indent + 1);
                let mut out = format!("type {} struct {{\n", t.name);
                for field in fields {
                    out.push_str(&format!("{inner}{}\n", self.field_text(field)));
                }
                out.push_str(&format!("{tabs}}}"));
                out
            }
            _ => format!("type {} {}", t.name, self.expr(&t.ty, indent)),
        }
    }

    fn expr(&self, e: &Expr, indent: usize) -> String {
        match e {
            Expr::Ident(id) => match &id.path {
                Some(path) => {
                    let alias = self
                        .aliases
                        .get(path)
                        .map(String::as_str)
                        .unwrap_or_else(|| default_alias(path));
                    format!("{alias}.{}", id.name)
                }
                None => id.name.clone(),
            },
            Expr::Selector { x, sel } => format!("{}.{sel}", self.expr(x, indent)),
            Expr::Call(c) => {
                let args: Vec<String> = c.args.iter().map(|a| self.expr(a, indent)).collect();
                format!("{}({})", self.expr(&c.fun, indent), args.join(", "))
            }
            Expr::BasicLit { value, .. } => value.clone(),
            Expr::CompositeLit {
                ty,
                elts,
                multiline,
            } => {
                let ty_text = ty
                    .as_ref()
                    .map(|t| self.expr(t, indent))
                    .unwrap_or_default();
                if elts.is_empty() {
                    return format!("{ty_text}{{}}");
                }
                if *multiline {
                    let tabs = "\t".repeat(indent);
                    let inner = "\t".repeat(indent + 1);
                    let mut out = format!("{ty_text}{{\n");
                    for elt in elts {
                        out.push_str(&format!("{inner}{},\n", self.expr(elt, indent + 1)));
                    }
                    out.push_str(&format!("{tabs}}}"));
                    out
                } else {
                    let elts: Vec<String> = elts.iter().map(|e| self.expr(e, indent)).collect();
                    format!("{ty_text}{{{}}}", elts.join(", "))
                }
            }
            Expr::KeyValue { key, value } => {
                format!("{}: {}", self.expr(key, indent), self.expr(value, indent))
            }
            Expr::Unary { op, x } => format!("{op}{}", self.expr(x, indent)),
            Expr::Binary { x, op, y } => {
                format!("{} {op} {}", self.expr(x, indent), self.expr(y, indent))
            }
            Expr::Star(x) => format!("*{}", self.expr(x, indent)),
            Expr::Paren(x) => format!("({})", self.expr(x, indent)),
            Expr::Index { x, index } => {
                format!("{}[{}]", self.expr(x, indent), self.expr(index, indent))
            }
            Expr::Slice { x, low, high } => format!(
                "{}[{}:{}]",
                self.expr(x, indent),
                low.as_ref().map(|e| self.expr(e, indent)).unwrap_or_default(),
                high.as_ref()
                    .map(|e| self.expr(e, indent))
                    .unwrap_or_default()
            ),
            Expr::ArrayType { len, elt } => match len {
                Some(len) => format!("[{}]{}", self.expr(len, indent), self.expr(elt, indent)),
                None => format!("[]{}", self.expr(elt, indent)),
            },
            Expr::MapType { key, value } => {
                format!(
                    "map[{}]{}",
                    self.expr(key, indent),
                    self.expr(value, indent)
                )
            }
            Expr::StructType { fields } => {
                if fields.is_empty() {
                    "struct{}".to_string()
                } else {
                    let fields: Vec<String> =
                        fields.iter().map(|f| self.field_text(f)).collect();
                    format!("struct{{ {} }}", fields.join("; "))
                }
            }
            Expr::FuncType(ty) => format!("func{}", self.func_signature(ty)),
            Expr::FuncLit(lit) => {
                let tabs = "\t".repeat(indent);
                format!(
                    "func{} {{\n{}{tabs}}}",
                    self.func_signature(&lit.ty),
                    self.block_body(&lit.body, indent + 1)
                )
            }
        }
    }
}

fn end_comment(decs: &Decorations) -> String {
    match decs.end.first() {
        Some(c) => format!(" {c}"),
        None => String::new(),
    }
}

/// Deep walk of every expression in the file, collecting the package paths of
/// qualified identifiers (unlike the statement-scoped inspect helpers, this
/// descends into nested blocks and function literal bodies).
fn collect_paths_in_file(file: &File, out: &mut BTreeSet<String>) {
    for decl in &file.decls {
        match decl {
            Decl::Func(f) => {
                if let Some(recv) = &f.recv {
                    collect_paths_in_expr(&recv.ty, out);
                }
                collect_paths_in_signature(&f.ty, out);
                collect_paths_in_block(&f.body, out);
            }
            Decl::Var(v) | Decl::Const(v) => {
                if let Some(ty) = &v.ty {
                    collect_paths_in_expr(ty, out);
                }
                for e in &v.values {
                    collect_paths_in_expr(e, out);
                }
            }
            Decl::Type(t) => collect_paths_in_expr(&t.ty, out),
        }
    }
}

fn collect_paths_in_signature(ty: &FuncType, out: &mut BTreeSet<String>) {
    for f in ty.params.iter().chain(ty.results.iter()) {
        collect_paths_in_expr(&f.ty, out);
    }
}

fn collect_paths_in_block(block: &Block, out: &mut BTreeSet<String>) {
    for stmt in &block.stmts {
        collect_paths_in_stmt(stmt, out);
    }
}

fn collect_paths_in_stmt(stmt: &Stmt, out: &mut BTreeSet<String>) {
    crate::ast::inspect_stmt_exprs(stmt, &mut |e| collect_paths_shallow(e, out));
    match stmt {
        Stmt::If(s) => {
            collect_paths_in_block(&s.body, out);
            match &s.els {
                Some(ElseBranch::If(next)) => {
                    collect_paths_in_stmt_if(next, out);
                }
                Some(ElseBranch::Block(b)) => collect_paths_in_block(b, out),
                None => {}
            }
        }
        Stmt::For(s) => collect_paths_in_block(&s.body, out),
        Stmt::Range(s) => collect_paths_in_block(&s.body, out),
        Stmt::Block(b, _) => collect_paths_in_block(b, out),
        Stmt::Type(t) => collect_paths_in_expr(&t.ty, out),
        Stmt::Var(v) => {
            if let Some(ty) = &v.ty {
                collect_paths_in_expr(ty, out);
            }
        }
        _ => {}
    }
}

fn collect_paths_in_stmt_if(s: &IfStmt, out: &mut BTreeSet<String>) {
    if let Some(init) = &s.init {
        collect_paths_in_stmt(init, out);
    }
    crate::ast::inspect_expr(&s.cond, &mut |e| collect_paths_shallow(e, out));
    collect_paths_in_block(&s.body, out);
    match &s.els {
        Some(ElseBranch::If(next)) => collect_paths_in_stmt_if(next, out),
        Some(ElseBranch::Block(b)) => collect_paths_in_block(b, out),
        None => {}
    }
}

/// Record the path of a single qualified ident, and recurse into the parts of
/// an expression the shallow inspectors skip (function literal bodies).
fn collect_paths_shallow(e: &Expr, out: &mut BTreeSet<String>) {
    match e {
        Expr::Ident(id) => {
            if let Some(path) = &id.path {
                out.insert(path.clone());
            }
        }
        Expr::FuncLit(lit) => {
            collect_paths_in_signature(&lit.ty, out);
            collect_paths_in_block(&lit.body, out);
        }
        Expr::FuncType(ty) => collect_paths_in_signature(ty, out),
        Expr::StructType { fields } => {
            for f in fields {
                collect_paths_in_expr(&f.ty, out);
            }
        }
        _ => {}
    }
}

fn collect_paths_in_expr(e: &Expr, out: &mut BTreeSet<String>) {
    crate::ast::inspect_expr(e, &mut |e| collect_paths_shallow(e, out));
}
