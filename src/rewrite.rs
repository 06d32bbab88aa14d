use crate::ast::{Block, CallExpr, ElseBranch, Expr, Ident, Stmt};
use crate::codegen;
use crate::error::Error;
use crate::manager::{self, InstrumentationManager, Invocation};
use crate::nethttp;
use crate::resolve::{BodyTypes, NEWRELIC_AGENT_IMPORT};

/// Transaction variable threaded through code reached from `main`.
pub const DEFAULT_TXN_NAME: &str = "txn";
/// Transaction variable bound in HTTP handler bodies.
pub const HANDLER_TXN_NAME: &str = "nrTxn";

/// Pending insertions around the statement currently being rewritten.
///
/// `insert_after` places each new statement immediately after the current one,
/// so successive calls stack in reverse, matching cursor semantics of the
/// decorated-AST libraries this models. A detached cursor (no safe insertion
/// point) ignores insertions; transforms check [`Self::index_valid`] first.
pub struct StmtCursor {
    before: Vec<Stmt>,
    after: Vec<Stmt>,
    valid: bool,
}

impl StmtCursor {
    pub fn new() -> Self {
        StmtCursor {
            before: Vec::new(),
            after: Vec::new(),
            valid: true,
        }
    }

    pub fn detached() -> Self {
        StmtCursor {
            before: Vec::new(),
            after: Vec::new(),
            valid: false,
        }
    }

    /// Whether the cursor points into a statement list that can take
    /// insertions.
    pub fn index_valid(&self) -> bool {
        self.valid
    }

    pub fn insert_before(&mut self, stmt: Stmt) {
        if self.valid {
            self.before.push(stmt);
        }
    }

    pub fn insert_after(&mut self, stmt: Stmt) {
        if self.valid {
            self.after.insert(0, stmt);
        }
    }

    fn flush_around(mut self, stmt: Stmt, out: &mut Vec<Stmt>) {
        out.append(&mut self.before);
        out.push(stmt);
        out.append(&mut self.after);
    }
}

impl Default for StmtCursor {
    fn default() -> Self {
        StmtCursor::new()
    }
}

/// How a function was reached by the tracer. Entry points (handlers, `main`)
/// keep their signatures; everything else gains a transaction parameter and a
/// segment timer, with goroutine targets named under an `async ` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceScope {
    EntryPoint,
    Function,
    Goroutine,
}

/// Rewrite a function body so every notable call site reports through the
/// in-scope transaction, tracing reachable user functions along the way.
/// Returns the declaration and whether anything changed; the caller decides
/// what a change means (adding the parameter, binding the transaction).
pub fn trace_function(
    mgr: &mut InstrumentationManager,
    decl: crate::ast::FuncDecl,
    txn_name: &str,
    scope: TraceScope,
) -> (crate::ast::FuncDecl, bool) {
    let mut decl = decl;
    let pkg = mgr.current_package().to_string();
    let bt = mgr.resolver.body_types(&decl, &pkg);
    let mut modified = false;
    trace_block(mgr, &mut decl.body, txn_name, &bt, &mut modified);

    if modified && scope != TraceScope::EntryPoint && !starts_with_defer_segment(&decl.body) {
        let segment = segment_name(&decl.name, scope);
        decl.body
            .stmts
            .insert(0, codegen::defer_segment(&segment, txn_name));
    }
    (decl, modified)
}

/// The segment name a traced function is timed under.
fn segment_name(fn_name: &str, scope: TraceScope) -> String {
    match scope {
        TraceScope::Goroutine => format!("async {fn_name}"),
        _ => fn_name.to_string(),
    }
}

/// One pass over a statement list. Per statement, in order: external HTTP
/// calls, nested handler registrations, tracing of called user functions,
/// goroutine propagation, error noticing, then recursion into nested blocks.
fn trace_block(
    mgr: &mut InstrumentationManager,
    block: &mut Block,
    txn_name: &str,
    bt: &BodyTypes,
    modified: &mut bool,
) {
    let stmts = std::mem::take(&mut block.stmts);
    let mut out: Vec<Stmt> = Vec::with_capacity(stmts.len());
    let mut iter = stmts.into_iter().peekable();

    while let Some(mut stmt) = iter.next() {
        let mut cur = StmtCursor::new();

        if nethttp::external_http_call(mgr, &mut stmt, out.last(), &mut cur, txn_name, bt) {
            *modified = true;
        }
        if nethttp::wrap_nested_handle_function(mgr, &mut stmt, txn_name, bt) {
            *modified = true;
        }

        let inv = mgr.get_package_function_invocation(&stmt);
        if let Some(inv) = &inv {
            if mgr.should_instrument_function(Some(inv)) {
                instrument_invocation(mgr, inv, txn_name, TraceScope::Function);
            }
            if let Some(call) = manager::top_level_call_mut(&mut stmt)
                && mgr.requires_transaction_argument(Some(inv), call, txn_name)
            {
                call.args.push(Expr::ident(txn_name));
                *modified = true;
            }
        }

        if goroutine_propagation(mgr, &mut stmt, txn_name, bt) {
            *modified = true;
        }

        // A call into a traced function notices its own errors; only
        // untraced call results are noticed here.
        let callee_traced = inv
            .as_ref()
            .is_some_and(|i| mgr.txn_param_of(i).is_some());
        if !callee_traced && notice_error(mgr, &mut stmt, iter.peek(), &mut cur, txn_name, bt) {
            *modified = true;
        }

        descend_nested(mgr, &mut stmt, txn_name, bt, modified);
        cur.flush_around(stmt, &mut out);
    }
    block.stmts = out;
}

fn descend_nested(
    mgr: &mut InstrumentationManager,
    stmt: &mut Stmt,
    txn_name: &str,
    bt: &BodyTypes,
    modified: &mut bool,
) {
    match stmt {
        Stmt::If(s) => descend_if(mgr, s, txn_name, bt, modified),
        Stmt::For(s) => trace_block(mgr, &mut s.body, txn_name, bt, modified),
        Stmt::Range(s) => trace_block(mgr, &mut s.body, txn_name, bt, modified),
        Stmt::Block(b, _) => trace_block(mgr, b, txn_name, bt, modified),
        _ => {}
    }
}

fn descend_if(
    mgr: &mut InstrumentationManager,
    s: &mut crate::ast::IfStmt,
    txn_name: &str,
    bt: &BodyTypes,
    modified: &mut bool,
) {
    trace_block(mgr, &mut s.body, txn_name, bt, modified);
    match &mut s.els {
        Some(ElseBranch::If(next)) => descend_if(mgr, next, txn_name, bt, modified),
        Some(ElseBranch::Block(b)) => trace_block(mgr, b, txn_name, bt, modified),
        None => {}
    }
}

/// Trace one indexed user function, switching the package focus for the
/// descent and adding the transaction parameter when the body changed.
fn instrument_invocation(
    mgr: &mut InstrumentationManager,
    inv: &Invocation,
    txn_name: &str,
    scope: TraceScope,
) {
    let root = mgr.current_package().to_string();
    if mgr.set_package(&inv.package).is_err() {
        // Invocation packages come from the index; this cannot miss.
        return;
    }
    if let Some(decl) = mgr.take_declaration(&inv.name) {
        mgr.mark_traced(&inv.name);
        let (mut decl, modified) = trace_function(mgr, decl, txn_name, scope);
        if modified {
            mgr.add_txn_argument_to_function_decl(&inv.name, &mut decl, txn_name);
            mgr.set_segment(&inv.name, &segment_name(&inv.name, scope));
            mgr.add_import(NEWRELIC_AGENT_IMPORT);
        }
        mgr.update_function_declaration(&inv.name, decl);
    }
    let _ = mgr.set_package(&root);
}

// StatefulTracingFunctions
//////////////////////////////////////////////

/// R1: after an assignment whose call returns an error, notice it on the
/// transaction. Declines for agent calls, `_` bindings, and assignments
/// already followed by the notice.
fn notice_error(
    mgr: &mut InstrumentationManager,
    stmt: &mut Stmt,
    next: Option<&Stmt>,
    cur: &mut StmtCursor,
    txn_name: &str,
    bt: &BodyTypes,
) -> bool {
    if !cur.index_valid() {
        return false;
    }
    let pkg = mgr.current_package().to_string();
    let Stmt::Assign(assign) = stmt else {
        return false;
    };
    let Some(err_var) = find_error_variable(mgr, assign, bt, &pkg) else {
        return false;
    };
    if next.is_some_and(|n| is_notice_error_for(n, &err_var)) {
        return false;
    }
    cur.insert_after(codegen::notice_error(&err_var, txn_name, &mut assign.decs));
    true
}

/// The name bound to the first error result of the assignment's call, if the
/// callee is not the agent itself and the binding is usable.
fn find_error_variable(
    mgr: &InstrumentationManager,
    assign: &crate::ast::AssignStmt,
    bt: &BodyTypes,
    pkg: &str,
) -> Option<String> {
    if assign.rhs.len() != 1 {
        return None;
    }
    let Expr::Call(call) = &assign.rhs[0] else {
        return None;
    };
    if is_newrelic_call(call) {
        return None;
    }
    let idx = mgr.resolver.error_return_index(call, bt, pkg)?;
    let name = assign.lhs.get(idx)?.as_bare_ident()?;
    if name == "_" {
        return None;
    }
    Some(name.to_string())
}

fn is_newrelic_call(call: &CallExpr) -> bool {
    matches!(
        &*call.fun,
        Expr::Ident(Ident { path: Some(p), .. }) if p == NEWRELIC_AGENT_IMPORT
    )
}

fn is_notice_error_for(stmt: &Stmt, err_var: &str) -> bool {
    let Stmt::Expr(e) = stmt else {
        return false;
    };
    let Expr::Call(call) = &e.x else {
        return false;
    };
    matches!(&*call.fun, Expr::Selector { sel, .. } if sel == "NoticeError")
        && matches!(
            call.args.first(),
            Some(Expr::Ident(Ident { name, path: None })) if name == err_var
        )
}

/// R4: goroutine launches. Named user-function targets get traced and handed
/// `txn.NewGoroutine()`; anonymous literals gain their own transaction
/// parameter, an `async literal` segment, and a traced body.
fn goroutine_propagation(
    mgr: &mut InstrumentationManager,
    stmt: &mut Stmt,
    txn_name: &str,
    bt: &BodyTypes,
) -> bool {
    let Stmt::Go(go) = stmt else {
        return false;
    };
    let Expr::Call(call) = &mut go.call else {
        return false;
    };

    if matches!(&*call.fun, Expr::FuncLit(_)) {
        let CallExpr { fun, args } = call;
        let Expr::FuncLit(lit) = &mut **fun else {
            return false;
        };
        if literal_has_txn_param(lit) {
            return false;
        }
        let pkg = mgr.current_package().to_string();
        let lit_bt = mgr.resolver.literal_types(lit, bt, &pkg);
        let mut changed = false;
        trace_block(mgr, &mut lit.body, txn_name, &lit_bt, &mut changed);
        lit.body
            .stmts
            .insert(0, codegen::defer_segment("async literal", txn_name));
        lit.ty.params.push(codegen::txn_as_parameter(txn_name));
        args.push(codegen::txn_new_goroutine(txn_name));
        mgr.add_import(NEWRELIC_AGENT_IMPORT);
        return true;
    }

    let inv = mgr.resolve_call(call);
    if let Some(inv) = &inv {
        if mgr.should_instrument_function(Some(inv)) {
            instrument_invocation(mgr, inv, txn_name, TraceScope::Goroutine);
        }
        if mgr.requires_transaction_argument(Some(inv), call, txn_name) {
            call.args.push(codegen::txn_new_goroutine(txn_name));
            mgr.add_import(NEWRELIC_AGENT_IMPORT);
            return true;
        }
    }
    false
}

fn literal_has_txn_param(lit: &crate::ast::FuncLit) -> bool {
    lit.ty.params.iter().any(|field| {
        matches!(
            &field.ty,
            Expr::Star(inner) if matches!(
                &**inner,
                Expr::Ident(Ident { name, path: Some(p) }) if p == NEWRELIC_AGENT_IMPORT && name == "Transaction"
            )
        )
    })
}

// StatelessTracingFunctions
//////////////////////////////////////////////

/// T1: bootstrap the agent in `main.main`, bookend calls to user functions
/// with transactions, and trace everything those calls reach. Returns false
/// when the package has no `main` function.
fn instrument_main(mgr: &mut InstrumentationManager) -> bool {
    let Some(mut decl) = mgr.take_declaration("main") else {
        return false;
    };
    mgr.mark_traced("main");

    if !is_agent_bootstrap(decl.body.stmts.first()) {
        let mut stmts = codegen::agent_init_stmts(&mgr.app_name, &mgr.agent_variable_name);
        stmts.append(&mut decl.body.stmts);
        decl.body.stmts = stmts;
        decl.body
            .stmts
            .push(codegen::shutdown_agent(&mgr.agent_variable_name));
        mgr.add_import(NEWRELIC_AGENT_IMPORT);
    }

    let pkg = mgr.current_package().to_string();
    let bt = mgr.resolver.body_types(&decl, &pkg);
    let mut txn_started = false;
    main_walk_block(mgr, &mut decl.body, &bt, &mut txn_started);

    mgr.update_function_declaration("main", decl);
    true
}

fn is_agent_bootstrap(stmt: Option<&Stmt>) -> bool {
    let Some(Stmt::Assign(assign)) = stmt else {
        return false;
    };
    matches!(
        assign.rhs.first(),
        Some(Expr::Call(c)) if matches!(
            &*c.fun,
            Expr::Ident(Ident { name, path: Some(p) }) if p == NEWRELIC_AGENT_IMPORT && name == "NewApplication"
        )
    )
}

fn main_walk_block(
    mgr: &mut InstrumentationManager,
    block: &mut Block,
    bt: &BodyTypes,
    txn_started: &mut bool,
) {
    let agent_var = mgr.agent_variable_name.clone();
    let stmts = std::mem::take(&mut block.stmts);
    let mut out: Vec<Stmt> = Vec::with_capacity(stmts.len());

    for mut stmt in stmts {
        let mut cur = StmtCursor::new();
        if matches!(stmt, Stmt::Expr(_)) {
            let inv = mgr.get_package_function_invocation(&stmt);
            if let Some(inv) = &inv {
                if mgr.should_instrument_function(Some(inv)) {
                    instrument_invocation(mgr, inv, DEFAULT_TXN_NAME, TraceScope::Function);
                }
                if let Some(call) = manager::top_level_call_mut(&mut stmt)
                    && mgr.requires_transaction_argument(Some(inv), call, DEFAULT_TXN_NAME)
                {
                    cur.insert_before(codegen::start_transaction(
                        &agent_var,
                        DEFAULT_TXN_NAME,
                        &inv.name,
                        *txn_started,
                    ));
                    cur.insert_after(codegen::end_transaction(DEFAULT_TXN_NAME));
                    call.args.push(Expr::ident(DEFAULT_TXN_NAME));
                    *txn_started = true;
                }
            }
        }
        nethttp::wrap_handle_func(mgr, &mut stmt, bt);

        match &mut stmt {
            Stmt::If(s) => main_walk_if(mgr, s, bt, txn_started),
            Stmt::For(s) => main_walk_block(mgr, &mut s.body, bt, txn_started),
            Stmt::Range(s) => main_walk_block(mgr, &mut s.body, bt, txn_started),
            Stmt::Block(b, _) => main_walk_block(mgr, b, bt, txn_started),
            _ => {}
        }
        cur.flush_around(stmt, &mut out);
    }
    block.stmts = out;
}

fn main_walk_if(
    mgr: &mut InstrumentationManager,
    s: &mut crate::ast::IfStmt,
    bt: &BodyTypes,
    txn_started: &mut bool,
) {
    main_walk_block(mgr, &mut s.body, bt, txn_started);
    match &mut s.els {
        Some(ElseBranch::If(next)) => main_walk_if(mgr, next, bt, txn_started),
        Some(ElseBranch::Block(b)) => main_walk_block(mgr, b, bt, txn_started),
        None => {}
    }
}

fn starts_with_defer_segment(body: &Block) -> bool {
    let Some(Stmt::Defer(d)) = body.stmts.first() else {
        return false;
    };
    let Expr::Call(end_call) = &d.call else {
        return false;
    };
    let Expr::Selector { x, sel } = &*end_call.fun else {
        return false;
    };
    if sel != "End" {
        return false;
    }
    matches!(
        &**x,
        Expr::Call(start) if matches!(&*start.fun, Expr::Selector { sel, .. } if sel == "StartSegment")
    )
}

// Top-level driver
//////////////////////////////////////////////

/// Run both driver passes over every loaded package: agent bootstrap and
/// tracing from `main`, handler discovery and tracing, then the stateless
/// call-site transforms.
pub fn instrument_packages(mgr: &mut InstrumentationManager) -> Result<(), Error> {
    let main_pkg = mgr.main_package_path().ok_or(Error::NoMainFunction)?;
    mgr.set_package(&main_pkg)?;
    if !instrument_main(mgr) {
        return Err(Error::NoMainFunction);
    }

    for pkg in mgr.package_paths() {
        mgr.set_package(&pkg)?;
        nethttp::instrument_handle_functions(mgr);
    }

    for pkg in mgr.package_paths() {
        mgr.set_package(&pkg)?;
        stateless_pass(mgr);
    }

    mgr.set_package(&main_pkg)?;
    Ok(())
}

/// The stateless statement walk: client transport injection, warnings for
/// non-instrumentable outbound calls, and top-level handler registration
/// wrapping, over every function in the current package.
fn stateless_pass(mgr: &mut InstrumentationManager) {
    for name in mgr.function_names() {
        let Some(mut decl) = mgr.take_declaration(&name) else {
            continue;
        };
        let file = mgr.file_path_of(&name).unwrap_or_default();
        let pkg = mgr.current_package().to_string();
        let bt = mgr.resolver.body_types(&decl, &pkg);
        stateless_walk_block(mgr, &mut decl.body, &file, &bt);
        mgr.update_function_declaration(&name, decl);
    }
}

fn stateless_walk_block(
    mgr: &mut InstrumentationManager,
    block: &mut Block,
    file: &str,
    bt: &BodyTypes,
) {
    let stmts = std::mem::take(&mut block.stmts);
    let mut out: Vec<Stmt> = Vec::with_capacity(stmts.len());
    let mut iter = stmts.into_iter().peekable();

    while let Some(mut stmt) = iter.next() {
        let mut cur = StmtCursor::new();
        nethttp::instrument_http_client(mgr, &mut stmt, iter.peek(), &mut cur);
        nethttp::cannot_instrument_http_method(mgr, &mut stmt, file);
        nethttp::wrap_handle_func(mgr, &mut stmt, bt);

        match &mut stmt {
            Stmt::If(s) => stateless_walk_if(mgr, s, file, bt),
            Stmt::For(s) => stateless_walk_block(mgr, &mut s.body, file, bt),
            Stmt::Range(s) => stateless_walk_block(mgr, &mut s.body, file, bt),
            Stmt::Block(b, _) => stateless_walk_block(mgr, b, file, bt),
            Stmt::Go(g) => stateless_walk_literal(mgr, &mut g.call, file, bt),
            Stmt::Defer(d) => stateless_walk_literal(mgr, &mut d.call, file, bt),
            _ => {}
        }
        cur.flush_around(stmt, &mut out);
    }
    block.stmts = out;
}

/// Walk into a launched literal's body so its statements get the same
/// call-site treatment.
fn stateless_walk_literal(
    mgr: &mut InstrumentationManager,
    call: &mut Expr,
    file: &str,
    bt: &BodyTypes,
) {
    if let Expr::Call(c) = call
        && let Expr::FuncLit(lit) = &mut *c.fun
    {
        stateless_walk_block(mgr, &mut lit.body, file, bt);
    }
}

fn stateless_walk_if(
    mgr: &mut InstrumentationManager,
    s: &mut crate::ast::IfStmt,
    file: &str,
    bt: &BodyTypes,
) {
    stateless_walk_block(mgr, &mut s.body, file, bt);
    match &mut s.els {
        Some(ElseBranch::If(next)) => stateless_walk_if(mgr, next, file, bt),
        Some(ElseBranch::Block(b)) => stateless_walk_block(mgr, b, file, bt),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Space;
    use crate::manager::DEFAULT_AGENT_VARIABLE;
    use crate::parser::parse_source;
    use crate::resolve::{Package, qualify_file};

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

    #[test]
    fn cursor_insert_after_stacks_in_reverse() {
        let mut cur = StmtCursor::new();
        cur.insert_after(Stmt::expr(Expr::call(Expr::ident("end"), vec![])));
        cur.insert_after(Stmt::expr(Expr::call(Expr::ident("capture"), vec![])));
        let mut out = Vec::new();
        cur.flush_around(Stmt::expr(Expr::call(Expr::ident("do"), vec![])), &mut out);

        let names: Vec<&str> = out
            .iter()
            .filter_map(|s| match s {
                Stmt::Expr(e) => match &e.x {
                    Expr::Call(c) => c.fun.as_bare_ident(),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["do", "capture", "end"]);
    }

    #[test]
    fn detached_cursor_drops_insertions() {
        let mut cur = StmtCursor::detached();
        assert!(!cur.index_valid());
        cur.insert_before(Stmt::expr(Expr::ident("x")));
        cur.insert_after(Stmt::expr(Expr::ident("y")));
        let mut out = Vec::new();
        cur.flush_around(Stmt::expr(Expr::ident("s")), &mut out);
        assert_eq!(out.len(), 1, "only the original statement survives");
    }

    #[test]
    fn main_gets_bootstrap_and_shutdown() {
        let mut mgr = manager_for(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\thttp.ListenAndServe(\":8080\", nil)\n}\n",
        );
        assert!(instrument_main(&mut mgr));
        let main = mgr.get_declaration("main").unwrap();

        assert!(
            is_agent_bootstrap(main.body.stmts.first()),
            "first statement must construct the application"
        );
        let Some(last) = main.body.stmts.last() else {
            panic!("main has statements");
        };
        assert_eq!(
            last.decorations().before,
            Space::Empty,
            "shutdown is separated by a blank line"
        );
        let Stmt::Expr(e) = last else {
            panic!("expected shutdown call");
        };
        let Expr::Call(c) = &e.x else {
            panic!("expected call");
        };
        assert_eq!(
            *c.fun,
            Expr::selector(Expr::ident(DEFAULT_AGENT_VARIABLE), "Shutdown")
        );
    }

    #[test]
    fn main_bootstrap_is_idempotent() {
        let mut mgr = manager_for(
            "package main\n\nimport \"net/http\"\n\nfunc main() {\n\thttp.ListenAndServe(\":8080\", nil)\n}\n",
        );
        assert!(instrument_main(&mut mgr));
        let first_len = mgr.get_declaration("main").unwrap().body.stmts.len();

        assert!(instrument_main(&mut mgr), "second run still finds main");
        let second_len = mgr.get_declaration("main").unwrap().body.stmts.len();
        assert_eq!(first_len, second_len, "second bootstrap must be a no-op");
    }

    #[test]
    fn user_call_in_main_is_bookended_with_a_transaction() {
        let mut mgr = manager_for(
            "package main\n\nimport \"net/http\"\n\nfunc doWork() {\n\t_, err := http.Get(\"http://example.com\")\n\t_ = err\n}\n\nfunc main() {\n\tdoWork()\n}\n",
        );
        assert!(instrument_main(&mut mgr));
        let main = mgr.get_declaration("main").unwrap();

        // bootstrap(2) + start + call + end + shutdown
        let texts: Vec<String> = main
            .body
            .stmts
            .iter()
            .map(|s| format!("{s:?}"))
            .collect();
        assert_eq!(main.body.stmts.len(), 6, "{texts:#?}");

        let Stmt::Assign(start) = &main.body.stmts[2] else {
            panic!("expected txn start assignment");
        };
        assert_eq!(start.lhs[0], Expr::ident(DEFAULT_TXN_NAME));

        let Stmt::Expr(call_stmt) = &main.body.stmts[3] else {
            panic!("expected the user call");
        };
        let Expr::Call(call) = &call_stmt.x else {
            panic!("expected call");
        };
        assert_eq!(
            call.args.last(),
            Some(&Expr::ident(DEFAULT_TXN_NAME)),
            "call site gains the transaction argument"
        );

        let do_work = mgr.get_declaration("doWork").unwrap();
        assert!(
            starts_with_defer_segment(&do_work.body),
            "traced callee gains a segment timer"
        );
        assert_eq!(
            do_work.ty.params.len(),
            1,
            "traced callee gains the transaction parameter"
        );
    }

    #[test]
    fn goroutine_literal_gains_transaction_plumbing() {
        let mut mgr = manager_for(
            "package main\n\nimport (\n\t\"net/http\"\n\t\"sync\"\n)\n\nfunc helper(url string) {\n\t_, err := http.Get(url)\n\t_ = err\n}\n\nfunc run() {\n\tvar wg sync.WaitGroup\n\twg.Add(1)\n\tgo func() {\n\t\tdefer wg.Done()\n\t\thelper(\"http://example.com\")\n\t}()\n\twg.Wait()\n}\n\nfunc main() {\n\trun()\n}\n",
        );
        let decl = mgr.take_declaration("run").unwrap();
        mgr.mark_traced("run");
        let (decl, modified) = trace_function(&mut mgr, decl, "nrTxn", TraceScope::Function);
        assert!(modified);

        let Stmt::Go(go) = &decl.body.stmts[3] else {
            panic!("expected go statement, got {:?}", decl.body.stmts[3]);
        };
        let Expr::Call(call) = &go.call else {
            panic!("expected call");
        };
        let Expr::FuncLit(lit) = &*call.fun else {
            panic!("expected literal");
        };
        assert_eq!(lit.ty.params.len(), 1, "literal gains the txn parameter");
        assert!(
            matches!(&lit.body.stmts[0], Stmt::Defer(_)),
            "literal body starts with the async segment"
        );
        assert_eq!(
            call.args.len(),
            1,
            "go site passes txn.NewGoroutine() as the argument"
        );

        // Running the propagation again must not double-instrument.
        let mut decl = decl;
        let pkg = "example".to_string();
        let bt = mgr.resolver.body_types(&decl, &pkg);
        let again = goroutine_propagation(&mut mgr, &mut decl.body.stmts[3], "nrTxn", &bt);
        assert!(!again, "literal already carries a transaction parameter");
    }
}
