use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use crate::ast::{CallExpr, Decl, Expr, File, FuncDecl, Ident, ImportSpec, Stmt};
use crate::codegen;
use crate::error::Error;
use crate::report::{TracedFunction, Warning};
use crate::resolve::{NEWRELIC_AGENT_IMPORT, Package, Resolver};

pub const DEFAULT_AGENT_VARIABLE: &str = "agent";

/// A direct call to a user function found in the package index.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub package: String,
    pub name: String,
}

/// Bookkeeping for one indexed function declaration. The record owns the
/// declaration node; the tracer checks it out, rewrites it, and stores it
/// back, so each declaration has exactly one live copy at all times.
struct FunctionRecord {
    decl: Option<FuncDecl>,
    /// Visited marker, flipped before the tracer descends into the body so
    /// call-graph cycles terminate.
    traced: bool,
    /// The transaction parameter name once the declaration has gained one.
    txn_param: Option<String>,
    /// The name of the segment the tracer timed this function under.
    segment: Option<String>,
    file_idx: usize,
    slot_idx: usize,
}

enum DeclSlot {
    /// A function hoisted into the index, referenced by qualified name.
    Func(String),
    Other(Decl),
}

struct FileState {
    path: PathBuf,
    package: String,
    header: Vec<String>,
    imports: Vec<ImportSpec>,
    slots: Vec<DeclSlot>,
}

struct PkgState {
    path: String,
    name: String,
    files: Vec<FileState>,
}

/// Owns the package index, the agent naming, the current-package focus, and
/// the pending import set. Every transform receives the manager explicitly;
/// there is no global state.
pub struct InstrumentationManager {
    pub resolver: Resolver,
    pub app_name: String,
    pub agent_variable_name: String,
    packages: Vec<PkgState>,
    records: HashMap<(String, String), FunctionRecord>,
    current_package: String,
    pending_imports: HashMap<String, BTreeSet<String>>,
    /// Non-instrumentable outbound calls found along the way, for the report.
    pub warnings: Vec<Warning>,
    /// Handler functions recognized and traced, for the report.
    pub handlers: Vec<String>,
}

impl InstrumentationManager {
    pub fn new(packages: Vec<Package>, app_name: &str, agent_variable_name: &str) -> Self {
        let resolver = Resolver::new(&packages);
        let mut records = HashMap::new();
        let mut states = Vec::new();
        let mut current_package = String::new();

        for pkg in packages {
            if current_package.is_empty() || pkg.name == "main" {
                current_package = pkg.path.clone();
            }
            let mut files = Vec::new();
            for (file_idx, file) in pkg.files.into_iter().enumerate() {
                let File {
                    path,
                    package,
                    header,
                    imports,
                    decls,
                } = file;
                let mut slots = Vec::new();
                for decl in decls {
                    match decl {
                        Decl::Func(f) => {
                            let name = f.qualified_name();
                            let slot_idx = slots.len();
                            let txn_param = existing_txn_param(&f);
                            records.insert(
                                (pkg.path.clone(), name.clone()),
                                FunctionRecord {
                                    traced: txn_param.is_some(),
                                    txn_param,
                                    segment: None,
                                    decl: Some(f),
                                    file_idx,
                                    slot_idx,
                                },
                            );
                            slots.push(DeclSlot::Func(name));
                        }
                        other => slots.push(DeclSlot::Other(other)),
                    }
                }
                files.push(FileState {
                    path,
                    package,
                    header,
                    imports,
                    slots,
                });
            }
            states.push(PkgState {
                path: pkg.path,
                name: pkg.name,
                files,
            });
        }

        InstrumentationManager {
            resolver,
            app_name: app_name.to_string(),
            agent_variable_name: agent_variable_name.to_string(),
            packages: states,
            records,
            current_package,
            pending_imports: HashMap::new(),
            warnings: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn current_package(&self) -> &str {
        &self.current_package
    }

    /// Switch the package focus for cross-package recursion. Selecting a
    /// package that was never loaded is a programmer error and fails loudly.
    pub fn set_package(&mut self, path: &str) -> Result<(), Error> {
        if !self.packages.iter().any(|p| p.path == path) {
            return Err(Error::UnknownPackage(path.to_string()));
        }
        self.current_package = path.to_string();
        Ok(())
    }

    /// The import paths of every loaded package, for resolving cross-package
    /// calls.
    pub fn package_paths(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.path.clone()).collect()
    }

    /// Names of the `main` packages' paths, if any package is named `main`.
    pub fn main_package_path(&self) -> Option<String> {
        self.packages
            .iter()
            .find(|p| p.name == "main")
            .map(|p| p.path.clone())
    }

    /// Function names of the current package, in declaration order.
    pub fn function_names(&self) -> Vec<String> {
        let Some(pkg) = self.packages.iter().find(|p| p.path == self.current_package) else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for file in &pkg.files {
            for slot in &file.slots {
                if let DeclSlot::Func(name) = slot {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Peek at a declaration in the current package without checking it out.
    pub fn get_declaration(&self, name: &str) -> Option<&FuncDecl> {
        self.records
            .get(&(self.current_package.clone(), name.to_string()))
            .and_then(|r| r.decl.as_ref())
    }

    /// Whether the named function in the current package has been visited.
    pub fn is_traced(&self, name: &str) -> bool {
        self.records
            .get(&(self.current_package.clone(), name.to_string()))
            .is_some_and(|r| r.traced)
    }

    /// The source file (relative path) declaring the named function in the
    /// current package.
    pub fn file_path_of(&self, name: &str) -> Option<String> {
        let record = self
            .records
            .get(&(self.current_package.clone(), name.to_string()))?;
        let pkg = self
            .packages
            .iter()
            .find(|p| p.path == self.current_package)?;
        Some(pkg.files.get(record.file_idx)?.path.display().to_string())
    }

    /// Check a declaration out of the index for rewriting. The caller must
    /// store it back with [`Self::update_function_declaration`].
    pub fn take_declaration(&mut self, name: &str) -> Option<FuncDecl> {
        self.records
            .get_mut(&(self.current_package.clone(), name.to_string()))
            .and_then(|r| r.decl.take())
    }

    /// Store a rewritten declaration back into its record, preserving flags.
    pub fn update_function_declaration(&mut self, name: &str, decl: FuncDecl) {
        if let Some(record) = self
            .records
            .get_mut(&(self.current_package.clone(), name.to_string()))
        {
            record.decl = Some(decl);
        }
    }

    /// Mark a function as visited before descending into its body, so cyclic
    /// and mutually recursive call graphs terminate.
    pub fn mark_traced(&mut self, name: &str) {
        if let Some(record) = self
            .records
            .get_mut(&(self.current_package.clone(), name.to_string()))
        {
            record.traced = true;
        }
    }

    /// Append a `*newrelic.Transaction` parameter to the declaration and flag
    /// the record. Idempotent: a second call (or a declaration that already
    /// carries the parameter) is a no-op.
    pub fn add_txn_argument_to_function_decl(
        &mut self,
        name: &str,
        decl: &mut FuncDecl,
        txn_name: &str,
    ) {
        let Some(record) = self
            .records
            .get_mut(&(self.current_package.clone(), name.to_string()))
        else {
            return;
        };
        if record.txn_param.is_some() {
            return;
        }
        if let Some(existing) = existing_txn_param(decl) {
            record.txn_param = Some(existing);
            return;
        }
        decl.ty.params.push(codegen::txn_as_parameter(txn_name));
        record.txn_param = Some(txn_name.to_string());
    }

    /// Resolve the statement's top-level expression to a direct call of an
    /// indexed user function, when it is one.
    pub fn get_package_function_invocation(&self, stmt: &Stmt) -> Option<Invocation> {
        let call = top_level_call(stmt)?;
        self.resolve_call(call)
    }

    /// Resolve a call expression to an indexed user function.
    pub fn resolve_call(&self, call: &CallExpr) -> Option<Invocation> {
        let (package, name) = match &*call.fun {
            Expr::Ident(Ident { name, path: None }) => (self.current_package.clone(), name.clone()),
            Expr::Ident(Ident {
                name,
                path: Some(path),
            }) => (path.clone(), name.clone()),
            _ => return None,
        };
        if self.records.contains_key(&(package.clone(), name.clone())) {
            Some(Invocation { package, name })
        } else {
            None
        }
    }

    /// True when the invocation targets user code that has not been traced
    /// yet.
    pub fn should_instrument_function(&self, inv: Option<&Invocation>) -> bool {
        match inv {
            Some(inv) => self
                .records
                .get(&(inv.package.clone(), inv.name.clone()))
                .is_some_and(|r| !r.traced),
            None => false,
        }
    }

    /// True when the invocation targets a function that now takes a
    /// transaction and this call site has not been given one.
    pub fn requires_transaction_argument(
        &self,
        inv: Option<&Invocation>,
        call: &CallExpr,
        txn_name: &str,
    ) -> bool {
        let Some(inv) = inv else {
            return false;
        };
        let Some(record) = self.records.get(&(inv.package.clone(), inv.name.clone())) else {
            return false;
        };
        let Some(param) = &record.txn_param else {
            return false;
        };
        !call_has_txn_argument(call, &[param, txn_name])
    }

    /// Record the segment name the tracer gave a function in the current
    /// package.
    pub fn set_segment(&mut self, name: &str, segment: &str) {
        if let Some(record) = self
            .records
            .get_mut(&(self.current_package.clone(), name.to_string()))
        {
            record.segment = Some(segment.to_string());
        }
    }

    /// The transaction parameter name a traced function was given.
    pub fn txn_param_of(&self, inv: &Invocation) -> Option<String> {
        self.records
            .get(&(inv.package.clone(), inv.name.clone()))
            .and_then(|r| r.txn_param.clone())
    }

    /// Record that the current package needs `path` imported. Emission derives
    /// imports from qualified identifiers per file; this set feeds reporting.
    pub fn add_import(&mut self, path: &str) {
        self.pending_imports
            .entry(self.current_package.clone())
            .or_default()
            .insert(path.to_string());
    }

    pub fn packages_needing_agent(&self) -> Vec<String> {
        self.pending_imports
            .iter()
            .filter(|(_, imports)| imports.contains(NEWRELIC_AGENT_IMPORT))
            .map(|(pkg, _)| pkg.clone())
            .collect()
    }

    /// Functions that ended up carrying a transaction parameter, with the
    /// segment name each is timed under.
    pub fn traced_functions(&self) -> Vec<TracedFunction> {
        let mut traced: Vec<TracedFunction> = self
            .records
            .iter()
            .filter(|(_, r)| r.txn_param.is_some())
            .map(|((pkg, name), r)| TracedFunction {
                package: pkg.clone(),
                name: name.clone(),
                segment: r.segment.clone().unwrap_or_else(|| name.clone()),
            })
            .collect();
        traced.sort_by(|a, b| (&a.package, &a.name).cmp(&(&b.package, &b.name)));
        traced
    }

    /// Reassemble the decorated files, putting every indexed declaration back
    /// into its slot.
    pub fn into_packages(mut self) -> Vec<Package> {
        let mut out = Vec::new();
        for pkg in &mut self.packages {
            let mut files = Vec::new();
            for (file_idx, state) in pkg.files.iter_mut().enumerate() {
                let mut decls = Vec::new();
                for (slot_idx, slot) in state.slots.drain(..).enumerate() {
                    match slot {
                        DeclSlot::Other(decl) => decls.push(decl),
                        DeclSlot::Func(name) => {
                            let record = self.records.get_mut(&(pkg.path.clone(), name.clone()));
                            let decl = record.and_then(|r| {
                                debug_assert!(
                                    r.file_idx == file_idx && r.slot_idx == slot_idx,
                                    "record slot mismatch for {name}"
                                );
                                r.decl.take()
                            });
                            if let Some(decl) = decl {
                                decls.push(Decl::Func(decl));
                            }
                        }
                    }
                }
                files.push(File {
                    path: std::mem::take(&mut state.path),
                    package: std::mem::take(&mut state.package),
                    header: std::mem::take(&mut state.header),
                    imports: std::mem::take(&mut state.imports),
                    decls,
                });
            }
            out.push(Package {
                path: pkg.path.clone(),
                name: pkg.name.clone(),
                files,
            });
        }
        out
    }
}

/// The declaration's existing `*newrelic.Transaction` parameter name, if it
/// already has one (a previous run of the tool, or hand instrumentation).
fn existing_txn_param(decl: &FuncDecl) -> Option<String> {
    for field in &decl.ty.params {
        if let Expr::Star(inner) = &field.ty
            && let Expr::Ident(Ident {
                name,
                path: Some(path),
            }) = &**inner
            && path == NEWRELIC_AGENT_IMPORT
            && name == "Transaction"
        {
            return field.names.first().cloned();
        }
    }
    None
}

/// The single call expression a statement's top-level expression evaluates:
/// an expression statement that is a call, or an assignment whose right-hand
/// side is one call.
pub fn top_level_call(stmt: &Stmt) -> Option<&CallExpr> {
    match stmt {
        Stmt::Expr(s) => match &s.x {
            Expr::Call(c) => Some(c),
            _ => None,
        },
        Stmt::Assign(s) if s.rhs.len() == 1 => match &s.rhs[0] {
            Expr::Call(c) => Some(c),
            _ => None,
        },
        _ => None,
    }
}

/// Mutable access to the same call [`top_level_call`] finds.
pub fn top_level_call_mut(stmt: &mut Stmt) -> Option<&mut CallExpr> {
    match stmt {
        Stmt::Expr(s) => match &mut s.x {
            Expr::Call(c) => Some(c),
            _ => None,
        },
        Stmt::Assign(s) if s.rhs.len() == 1 => match &mut s.rhs[0] {
            Expr::Call(c) => Some(c),
            _ => None,
        },
        _ => None,
    }
}

/// Whether the call already carries a transaction argument: a trailing bare
/// identifier with one of the expected names, or a `NewGoroutine()` call.
fn call_has_txn_argument(call: &CallExpr, names: &[&str]) -> bool {
    match call.args.last() {
        Some(Expr::Ident(Ident { name, path: None })) => names.contains(&name.as_str()),
        Some(Expr::Call(inner)) => {
            matches!(&*inner.fun, Expr::Selector { sel, .. } if sel == "NewGoroutine")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::resolve::qualify_file;

    fn manager_for(src: &str) -> InstrumentationManager {
        let mut file = parse_source("main.go", src).expect("fixture should parse");
        qualify_file(&mut file);
        let pkg = Package {
            path: "example".into(),
            name: "main".into(),
            files: vec![file],
        };
        InstrumentationManager::new(vec![pkg], "demo", DEFAULT_AGENT_VARIABLE)
    }

    const HELPER_APP: &str = "package main\n\nfunc helper(url string) error {\n\treturn nil\n}\n\nfunc main() {\n\thelper(\"x\")\n}\n";

    #[test]
    fn invocation_resolves_indexed_function() {
        let mgr = manager_for(HELPER_APP);
        let main = {
            let mut m = manager_for(HELPER_APP);
            m.take_declaration("main").unwrap()
        };
        let inv = mgr.get_package_function_invocation(&main.body.stmts[0]);
        assert_eq!(
            inv,
            Some(Invocation {
                package: "example".into(),
                name: "helper".into()
            })
        );
    }

    #[test]
    fn should_instrument_only_untraced_functions() {
        let mut mgr = manager_for(HELPER_APP);
        let inv = Invocation {
            package: "example".into(),
            name: "helper".into(),
        };
        assert!(mgr.should_instrument_function(Some(&inv)));
        mgr.mark_traced("helper");
        assert!(!mgr.should_instrument_function(Some(&inv)));
        assert!(!mgr.should_instrument_function(None));
    }

    #[test]
    fn txn_argument_append_is_idempotent() {
        let mut mgr = manager_for(HELPER_APP);
        let mut decl = mgr.take_declaration("helper").unwrap();
        assert_eq!(decl.ty.params.len(), 1);

        mgr.add_txn_argument_to_function_decl("helper", &mut decl, "nrTxn");
        assert_eq!(decl.ty.params.len(), 2, "transaction parameter appended");

        mgr.add_txn_argument_to_function_decl("helper", &mut decl, "nrTxn");
        assert_eq!(decl.ty.params.len(), 2, "second call must be a no-op");
        mgr.update_function_declaration("helper", decl);
    }

    #[test]
    fn requires_argument_until_call_site_has_one() {
        let mut mgr = manager_for(HELPER_APP);
        let mut decl = mgr.take_declaration("helper").unwrap();
        mgr.add_txn_argument_to_function_decl("helper", &mut decl, "nrTxn");
        mgr.update_function_declaration("helper", decl);

        let inv = Invocation {
            package: "example".into(),
            name: "helper".into(),
        };
        let bare = CallExpr {
            fun: Box::new(Expr::ident("helper")),
            args: vec![Expr::string_lit("x")],
        };
        assert!(mgr.requires_transaction_argument(Some(&inv), &bare, "nrTxn"));

        let given = CallExpr {
            fun: Box::new(Expr::ident("helper")),
            args: vec![Expr::string_lit("x"), Expr::ident("nrTxn")],
        };
        assert!(!mgr.requires_transaction_argument(Some(&inv), &given, "nrTxn"));

        let goroutine = CallExpr {
            fun: Box::new(Expr::ident("helper")),
            args: vec![
                Expr::string_lit("x"),
                codegen::txn_new_goroutine("nrTxn"),
            ],
        };
        assert!(!mgr.requires_transaction_argument(Some(&inv), &goroutine, "nrTxn"));
    }

    #[test]
    fn preinstrumented_declaration_is_marked_at_load() {
        let mgr = manager_for(
            "package main\n\nimport \"github.com/newrelic/go-agent/v3/newrelic\"\n\nfunc helper(url string, nrTxn *newrelic.Transaction) error {\n\treturn nil\n}\n\nfunc main() {\n\thelper(\"x\", nil)\n}\n",
        );
        let inv = Invocation {
            package: "example".into(),
            name: "helper".into(),
        };
        assert!(
            !mgr.should_instrument_function(Some(&inv)),
            "a declaration that already takes a transaction must not be re-traced"
        );
        assert_eq!(mgr.txn_param_of(&inv), Some("nrTxn".to_string()));
    }

    #[test]
    fn set_package_rejects_unknown_paths() {
        let mut mgr = manager_for(HELPER_APP);
        assert!(mgr.set_package("example").is_ok());
        assert!(matches!(
            mgr.set_package("nope"),
            Err(Error::UnknownPackage(_))
        ));
    }

    #[test]
    fn into_packages_restores_declarations() {
        let mut mgr = manager_for(HELPER_APP);
        let decl = mgr.take_declaration("helper").unwrap();
        mgr.update_function_declaration("helper", decl);
        let packages = mgr.into_packages();
        assert_eq!(packages.len(), 1);
        let file = &packages[0].files[0];
        assert_eq!(file.decls.len(), 2, "both declarations restored in order");
    }
}
