use crate::ast::{
    AssignStmt, AssignTok, Block, Expr, Ident, Space, Stmt, for_each_call_mut, inspect_stmt_exprs,
};
use crate::codegen;
use crate::manager::InstrumentationManager;
use crate::report::Warning;
use crate::resolve::{BodyTypes, NET_HTTP_PATH, NEWRELIC_AGENT_IMPORT};
use crate::rewrite::{HANDLER_TXN_NAME, StmtCursor, TraceScope, trace_function};

// Methods that can be instrumented
pub const HTTP_HANDLE_FUNC: &str = "HandleFunc";
pub const HTTP_MUX_HANDLE: &str = "Handle";
pub const HTTP_DO: &str = "Do";

// methods that can not be instrumented
pub const HTTP_GET: &str = "Get";
pub const HTTP_POST: &str = "Post";
pub const HTTP_HEAD: &str = "Head";
pub const HTTP_POST_FORM: &str = "PostForm";

// default net/http client variable
pub const HTTP_DEFAULT_CLIENT_VARIABLE: &str = "DefaultClient";

pub const SEGMENT_VARIABLE: &str = "externalSegment";

/// T5: recognize HTTP handler declarations in the current package and trace
/// their bodies. A handler that picked up any instrumentation gains the
/// `nrTxn := newrelic.FromContext(r.Context())` binding as its first
/// statement.
pub fn instrument_handle_functions(mgr: &mut InstrumentationManager) {
    for name in mgr.function_names() {
        let (is_handler, collision) = {
            let Some(decl) = mgr.get_declaration(&name) else {
                continue;
            };
            (
                mgr.resolver.is_http_handler(decl),
                binds_name(&decl.body, HANDLER_TXN_NAME),
            )
        };
        if !is_handler || mgr.is_traced(&name) {
            continue;
        }
        if collision {
            // The handler already uses the transaction variable name for
            // something else; renaming silently would change its meaning.
            let file = mgr.file_path_of(&name).unwrap_or_default();
            mgr.warnings.push(Warning {
                file,
                method: None,
                detail: format!("handler {name} skipped: {HANDLER_TXN_NAME} is already bound"),
            });
            continue;
        }

        let Some(decl) = mgr.take_declaration(&name) else {
            continue;
        };
        mgr.mark_traced(&name);
        let (mut decl, modified) = trace_function(mgr, decl, HANDLER_TXN_NAME, TraceScope::EntryPoint);
        if modified {
            if !starts_with_from_context(&decl.body) {
                decl.body
                    .stmts
                    .insert(0, codegen::txn_from_context(HANDLER_TXN_NAME));
            }
            mgr.add_import(NEWRELIC_AGENT_IMPORT);
            mgr.handlers.push(name.clone());
        }
        mgr.update_function_declaration(&name, decl);
    }
}

/// Whether the body already begins with the handler transaction binding.
fn starts_with_from_context(body: &Block) -> bool {
    let Some(Stmt::Assign(assign)) = body.stmts.first() else {
        return false;
    };
    assign.rhs.len() == 1
        && matches!(
            &assign.rhs[0],
            Expr::Call(c) if matches!(
                &*c.fun,
                Expr::Ident(Ident { name, path: Some(p) }) if p == NEWRELIC_AGENT_IMPORT && name == "FromContext"
            )
        )
}

/// Whether the block (deeply) defines a binding with this name outside of the
/// `FromContext` pattern.
fn binds_name(block: &Block, name: &str) -> bool {
    block.stmts.iter().any(|stmt| stmt_binds_name(stmt, name))
}

fn stmt_binds_name(stmt: &Stmt, name: &str) -> bool {
    match stmt {
        Stmt::Assign(s) if s.tok == AssignTok::Define => {
            let binds = s.lhs.iter().any(|e| e.as_bare_ident() == Some(name));
            if !binds {
                return false;
            }
            // The binding this tool writes itself does not count.
            !matches!(
                s.rhs.first(),
                Some(Expr::Call(c)) if matches!(
                    &*c.fun,
                    Expr::Ident(Ident { name: f, path: Some(p) }) if p == NEWRELIC_AGENT_IMPORT && f == "FromContext"
                )
            )
        }
        Stmt::Var(v) => v.names.iter().any(|n| n == name),
        Stmt::If(s) => {
            s.init.as_deref().is_some_and(|i| stmt_binds_name(i, name))
                || binds_name(&s.body, name)
                || match &s.els {
                    Some(crate::ast::ElseBranch::If(next)) => {
                        stmt_binds_name(&Stmt::If((**next).clone()), name)
                    }
                    Some(crate::ast::ElseBranch::Block(b)) => binds_name(b, name),
                    None => false,
                }
        }
        Stmt::For(s) => {
            s.init.as_deref().is_some_and(|i| stmt_binds_name(i, name)) || binds_name(&s.body, name)
        }
        Stmt::Range(s) => {
            (s.tok == AssignTok::Define
                && s.key
                    .iter()
                    .chain(s.value.iter())
                    .any(|e| e.as_bare_ident() == Some(name)))
                || binds_name(&s.body, name)
        }
        Stmt::Block(b, _) => binds_name(b, name),
        _ => false,
    }
}

/// T2: after `client := &http.Client{}`, wire the agent's round tripper into
/// the client's transport. The definition's trailing blank line moves to the
/// inserted statement.
pub fn instrument_http_client(
    mgr: &mut InstrumentationManager,
    stmt: &mut Stmt,
    next: Option<&Stmt>,
    cur: &mut StmtCursor,
) -> bool {
    if !cur.index_valid() {
        return false;
    }
    let Stmt::Assign(assign) = stmt else {
        return false;
    };
    if !is_net_http_client_definition(assign) {
        return false;
    }
    if next.is_some_and(|n| is_round_tripper_injection(n, &assign.lhs[0])) {
        return false;
    }

    let client = assign.lhs[0].clone();
    let spacing = assign.decs.after;
    assign.decs.after = Space::None;
    cur.insert_after(codegen::inject_round_tripper(&client, spacing));
    mgr.add_import(NEWRELIC_AGENT_IMPORT);
    true
}

/// `ident := &http.Client{...}` in any lvalue position.
fn is_net_http_client_definition(assign: &AssignStmt) -> bool {
    if assign.tok != AssignTok::Define || assign.lhs.len() != 1 || assign.rhs.len() != 1 {
        return false;
    }
    let Expr::Unary { op, x } = &assign.rhs[0] else {
        return false;
    };
    if op != "&" {
        return false;
    }
    let Expr::CompositeLit { ty: Some(ty), .. } = &**x else {
        return false;
    };
    matches!(
        &**ty,
        Expr::Ident(Ident { name, path: Some(p) }) if p == NET_HTTP_PATH && name == "Client"
    )
}

/// Whether `stmt` is already the `client.Transport = ...` injection for this
/// client expression.
fn is_round_tripper_injection(stmt: &Stmt, client: &Expr) -> bool {
    let Stmt::Assign(assign) = stmt else {
        return false;
    };
    assign.tok == AssignTok::Assign
        && assign.lhs.len() == 1
        && assign.lhs[0] == Expr::selector(client.clone(), "Transport")
}

/// T3: statements that call an outbound `net/http` method the agent can not
/// wrap get a warning comment block prepended to their leading comments.
pub fn cannot_instrument_http_method(
    mgr: &mut InstrumentationManager,
    stmt: &mut Stmt,
    file: &str,
) -> bool {
    if !matches!(stmt, Stmt::Assign(_) | Stmt::Expr(_)) {
        return false;
    }
    let Some(method) = net_http_method_cannot_instrument(stmt) else {
        return false;
    };
    let decs = stmt.decorations_mut();
    if decs
        .start
        .iter()
        .any(|c| c.contains("can not be instrumented"))
    {
        return false;
    }

    let mut comments = codegen::cannot_trace_comment(&method, decs);
    comments.append(&mut decs.start);
    decs.start = comments;
    mgr.warnings.push(Warning {
        file: file.to_string(),
        detail: format!("the http.{method}() call can not be traced"),
        method: Some(method),
    });
    true
}

/// The first package-level outbound call in the statement that can not carry
/// a transaction (`http.Get` and friends; calls through a client value are
/// instrumentable and do not match).
fn net_http_method_cannot_instrument(stmt: &Stmt) -> Option<String> {
    let mut found = None;
    inspect_stmt_exprs(stmt, &mut |e| {
        if found.is_some() {
            return;
        }
        if let Expr::Call(call) = e
            && let Expr::Ident(Ident {
                name,
                path: Some(path),
            }) = &*call.fun
            && path == NET_HTTP_PATH
            && matches!(name.as_str(), HTTP_GET | HTTP_POST | HTTP_POST_FORM | HTTP_HEAD)
        {
            found = Some(name.clone());
        }
    });
    found
}

/// T4: rewrite two-argument `http.HandleFunc`/`Handle` registrations into
/// `newrelic.WrapHandleFunc(agent, pattern, handler)` calls using the
/// manager's agent variable.
pub fn wrap_handle_func(mgr: &mut InstrumentationManager, stmt: &mut Stmt, bt: &BodyTypes) -> bool {
    let agent = mgr.agent_variable_name.clone();
    wrap_registrations(mgr, stmt, bt, &Expr::Ident(Ident::new(agent)))
}

/// R3: the same rewrite inside an already-traced body, where the application
/// handle comes from the transaction: `txn.Application()`.
pub fn wrap_nested_handle_function(
    mgr: &mut InstrumentationManager,
    stmt: &mut Stmt,
    txn_name: &str,
    bt: &BodyTypes,
) -> bool {
    let app = Expr::call(
        Expr::selector(Expr::ident(txn_name), "Application"),
        vec![],
    );
    wrap_registrations(mgr, stmt, bt, &app)
}

fn wrap_registrations(
    mgr: &mut InstrumentationManager,
    stmt: &mut Stmt,
    bt: &BodyTypes,
    app_expr: &Expr,
) -> bool {
    let pkg = mgr.current_package().to_string();
    let mut modified = false;
    {
        let resolver = &mgr.resolver;
        for_each_call_mut(stmt, &mut |call| {
            let method = resolver.net_http_method(call, bt, &pkg);
            if matches!(
                method.as_deref(),
                Some(HTTP_HANDLE_FUNC) | Some(HTTP_MUX_HANDLE)
            ) && call.args.len() == 2
            {
                let old_args = std::mem::take(&mut call.args);
                let mut wrapped = vec![app_expr.clone()];
                wrapped.extend(old_args);
                call.args = vec![Expr::call(
                    Expr::qualified("WrapHandleFunc", NEWRELIC_AGENT_IMPORT),
                    wrapped,
                )];
                modified = true;
            }
        });
    }
    if modified {
        mgr.add_import(NEWRELIC_AGENT_IMPORT);
    }
    modified
}

/// R2: instrument an outbound `Do` call. Default-client calls are bracketed
/// with an external segment (capturing the response when one is bound);
/// custom-client calls get the transaction attached to the request context,
/// relying on the round tripper injected by T2.
pub fn external_http_call(
    mgr: &mut InstrumentationManager,
    stmt: &mut Stmt,
    prev: Option<&Stmt>,
    cur: &mut StmtCursor,
    txn_name: &str,
    bt: &BodyTypes,
) -> bool {
    if !cur.index_valid() {
        return false;
    }
    let pkg = mgr.current_package().to_string();

    let mut found: Option<(Expr, bool)> = None;
    inspect_stmt_exprs(stmt, &mut |e| {
        if found.is_some() {
            return;
        }
        if let Expr::Call(call) = e
            && mgr.resolver.net_http_method(call, bt, &pkg).as_deref() == Some(HTTP_DO)
            && let Some(request) = call.args.first()
        {
            let is_default = mgr.resolver.net_http_package_client(call).as_deref()
                == Some(HTTP_DEFAULT_CLIENT_VARIABLE);
            found = Some((request.clone(), is_default));
        }
    });
    let Some((request, is_default)) = found else {
        return false;
    };
    if prev.is_some_and(is_agent_request_setup) {
        return false;
    }

    let response = mgr.resolver.response_expr(stmt, bt, &pkg).cloned();
    let decs = stmt.decorations_mut();
    if is_default {
        cur.insert_before(codegen::start_external_segment(
            &request,
            txn_name,
            SEGMENT_VARIABLE,
            decs,
        ));
        cur.insert_after(codegen::end_external_segment(SEGMENT_VARIABLE, decs));
        if let Some(response) = response {
            cur.insert_after(codegen::capture_http_response(SEGMENT_VARIABLE, &response));
        }
    } else {
        cur.insert_before(codegen::request_with_txn_context(&request, txn_name, decs));
    }
    mgr.add_import(NEWRELIC_AGENT_IMPORT);
    true
}

/// Whether the statement is one this transform inserted on a previous run.
fn is_agent_request_setup(stmt: &Stmt) -> bool {
    let Stmt::Assign(assign) = stmt else {
        return false;
    };
    matches!(
        assign.rhs.first(),
        Some(Expr::Call(c)) if matches!(
            &*c.fun,
            Expr::Ident(Ident { name, path: Some(p) })
                if p == NEWRELIC_AGENT_IMPORT
                    && (name == "StartExternalSegment" || name == "RequestWithTransactionContext")
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn main_stmts(mgr: &mut InstrumentationManager) -> Vec<Stmt> {
        mgr.take_declaration("main").expect("main exists").body.stmts
    }

    #[test]
    fn recognizes_client_definitions() {
        let cases = [
            ("client := &http.Client{}", true),
            ("client := &http.Client{\n\t\tTimeout: x,\n\t}", true),
            ("client = &http.Client{}", false),
            ("client := &http.Transport{}", false),
        ];
        for (line, want) in cases {
            let src =
                format!("package main\n\nimport \"net/http\"\n\nfunc main() {{\n\t{line}\n}}\n");
            let mut mgr = manager_for(&src);
            let stmts = main_stmts(&mut mgr);
            let got = match &stmts[0] {
                Stmt::Assign(a) => is_net_http_client_definition(a),
                _ => false,
            };
            assert_eq!(got, want, "client detection for `{line}`");
        }
    }

    #[test]
    fn recognizes_non_instrumentable_methods() {
        let cases = [
            ("http.Get(\"http://example.com\")", Some("Get")),
            ("http.Post(\"http://example.com\")", Some("Post")),
            ("http.PostForm(\"http://example.com\")", Some("PostForm")),
            ("http.Head(\"http://example.com\")", Some("Head")),
            ("http.NewRequest(\"GET\", \"http://example.com\", nil)", None),
        ];
        for (line, want) in cases {
            let src =
                format!("package main\n\nimport \"net/http\"\n\nfunc main() {{\n\t{line}\n}}\n");
            let mut mgr = manager_for(&src);
            let stmts = main_stmts(&mut mgr);
            assert_eq!(
                net_http_method_cannot_instrument(&stmts[0]).as_deref(),
                want,
                "detection for `{line}`"
            );
        }
    }

    #[test]
    fn client_method_calls_are_not_flagged() {
        let src = "package main\n\nimport \"net/http\"\n\nfunc main() {\n\tclient := &http.Client{}\n\tclient.Get(\"https://example.com\")\n}\n";
        let mut mgr = manager_for(src);
        let stmts = main_stmts(&mut mgr);
        assert_eq!(
            net_http_method_cannot_instrument(&stmts[1]),
            None,
            "client.Get is instrumentable through the round tripper"
        );
    }

    #[test]
    fn warning_block_is_prepended_once() {
        let src = "package main\n\nimport \"net/http\"\n\nfunc main() {\n\thttp.Get(\"http://example.com\")\n}\n";
        let mut mgr = manager_for(src);
        let mut stmts = main_stmts(&mut mgr);

        assert!(cannot_instrument_http_method(&mut mgr, &mut stmts[0], "main.go"));
        assert_eq!(stmts[0].decorations().start.len(), 3);
        assert!(stmts[0].decorations().start[0].contains("\"http.Get()\""));

        assert!(
            !cannot_instrument_http_method(&mut mgr, &mut stmts[0], "main.go"),
            "second application must be a no-op"
        );
        assert_eq!(stmts[0].decorations().start.len(), 3);
        assert_eq!(mgr.warnings.len(), 1);
    }

    #[test]
    fn warning_block_separates_existing_comments() {
        let src = "package main\n\nimport \"net/http\"\n\nfunc main() {\n\t// fetch the page\n\thttp.Get(\"http://example.com\")\n}\n";
        let mut mgr = manager_for(src);
        let mut stmts = main_stmts(&mut mgr);

        assert!(cannot_instrument_http_method(&mut mgr, &mut stmts[0], "main.go"));
        let start = &stmts[0].decorations().start;
        assert_eq!(start.len(), 5, "warning, separator, then original comment");
        assert_eq!(start[3], "//");
        assert_eq!(start[4], "// fetch the page");
    }

    #[test]
    fn wrap_handle_func_rewrites_two_argument_registrations() {
        let src = "package main\n\nimport \"net/http\"\n\nfunc main() {\n\thttp.HandleFunc(\"/\", index)\n}\n";
        let mut mgr = manager_for(src);
        let mut stmts = main_stmts(&mut mgr);
        let bt = BodyTypes::default();

        assert!(wrap_handle_func(&mut mgr, &mut stmts[0], &bt));
        let Stmt::Expr(e) = &stmts[0] else {
            panic!("expected expr stmt");
        };
        let Expr::Call(call) = &e.x else {
            panic!("expected call");
        };
        assert_eq!(call.args.len(), 1, "arguments replaced by the wrapper call");
        let Expr::Call(wrapper) = &call.args[0] else {
            panic!("expected wrapper call");
        };
        assert_eq!(
            *wrapper.fun,
            Expr::qualified("WrapHandleFunc", NEWRELIC_AGENT_IMPORT)
        );
        assert_eq!(wrapper.args.len(), 3);
        assert_eq!(wrapper.args[0], Expr::ident(DEFAULT_AGENT_VARIABLE));

        assert!(
            !wrap_handle_func(&mut mgr, &mut stmts[0], &bt),
            "wrapped registration has one argument and must not re-wrap"
        );
    }

    #[test]
    fn mux_handle_is_wrapped_through_its_type() {
        let src = "package main\n\nimport \"net/http\"\n\nfunc main() {\n\tmux := http.NewServeMux()\n\tmux.Handle(\"/\", index)\n}\n";
        let mut mgr = manager_for(src);
        let decl = mgr.take_declaration("main").unwrap();
        let bt = mgr.resolver.body_types(&decl, "example");
        let mut stmts = decl.body.stmts;

        assert!(wrap_nested_handle_function(
            &mut mgr,
            &mut stmts[1],
            "txn",
            &bt
        ));
        let Stmt::Expr(e) = &stmts[1] else {
            panic!("expected expr stmt");
        };
        let Expr::Call(call) = &e.x else {
            panic!("expected call");
        };
        let Expr::Call(wrapper) = &call.args[0] else {
            panic!("expected wrapper call");
        };
        // txn.Application() supplies the agent inside traced bodies.
        let Expr::Call(app) = &wrapper.args[0] else {
            panic!("expected txn.Application() call");
        };
        assert_eq!(
            *app.fun,
            Expr::selector(Expr::ident("txn"), "Application")
        );
    }

    #[test]
    fn handler_collision_detection() {
        let body_ok = "package main\n\nimport \"net/http\"\n\nfunc h(w http.ResponseWriter, r *http.Request) {\n\tx := 1\n\t_ = x\n}\n";
        let mgr = manager_for(body_ok);
        let decl = mgr.get_declaration("h").unwrap();
        assert!(!binds_name(&decl.body, "nrTxn"));

        let body_collides = "package main\n\nimport \"net/http\"\n\nfunc h(w http.ResponseWriter, r *http.Request) {\n\tnrTxn := 1\n\t_ = nrTxn\n}\n";
        let mgr = manager_for(body_collides);
        let decl = mgr.get_declaration("h").unwrap();
        assert!(binds_name(&decl.body, "nrTxn"));
    }
}
