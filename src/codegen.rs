use crate::ast::{
    AssignStmt, AssignTok, Block, Decorations, DeferStmt, Expr, ExprStmt, Field, IfStmt, Space,
    Stmt, move_leading, move_trailing,
};
use crate::resolve::NEWRELIC_AGENT_IMPORT;

// Code generation
//////////////////////////////////////////////

fn panic_on_error() -> Stmt {
    Stmt::If(IfStmt {
        init: None,
        cond: Expr::Binary {
            x: Box::new(Expr::ident("err")),
            op: "!=".to_string(),
            y: Box::new(Expr::ident("nil")),
        },
        body: Block {
            stmts: vec![Stmt::expr(Expr::call(
                Expr::ident("panic"),
                vec![Expr::ident("err")],
            ))],
            tail_comments: vec![],
        },
        els: None,
        decs: Decorations {
            after: Space::Empty,
            ..Default::default()
        },
    })
}

/// The agent bootstrap: `agent, err := newrelic.NewApplication(...)` followed
/// by a panic guard. `ConfigAppName` is included only when an application name
/// was configured.
pub fn agent_init_stmts(app_name: &str, agent_var: &str) -> Vec<Stmt> {
    let mut args = vec![Expr::call(
        Expr::qualified("ConfigFromEnvironment", NEWRELIC_AGENT_IMPORT),
        vec![],
    )];
    if !app_name.is_empty() {
        args.insert(
            0,
            Expr::call(
                Expr::qualified("ConfigAppName", NEWRELIC_AGENT_IMPORT),
                vec![Expr::string_lit(app_name)],
            ),
        );
    }

    let init = Stmt::Assign(AssignStmt {
        lhs: vec![Expr::ident(agent_var), Expr::ident("err")],
        tok: AssignTok::Define,
        rhs: vec![Expr::call(
            Expr::qualified("NewApplication", NEWRELIC_AGENT_IMPORT),
            args,
        )],
        decs: Decorations::default(),
    });

    vec![init, panic_on_error()]
}

/// `agent.Shutdown(5 * time.Second)`, separated from the statements above it.
pub fn shutdown_agent(agent_var: &str) -> Stmt {
    Stmt::Expr(ExprStmt {
        x: Expr::call(
            Expr::selector(Expr::ident(agent_var), "Shutdown"),
            vec![Expr::Binary {
                x: Box::new(Expr::int_lit(5)),
                op: "*".to_string(),
                y: Box::new(Expr::qualified("Second", "time")),
            }],
        ),
        decs: Decorations {
            before: Space::Empty,
            ..Default::default()
        },
    })
}

/// Start a transaction on the agent. The first transaction in a body defines
/// the variable; later ones overwrite it with plain assignment.
pub fn start_transaction(
    agent_var: &str,
    txn_var: &str,
    txn_name: &str,
    overwrite_variable: bool,
) -> Stmt {
    let tok = if overwrite_variable {
        AssignTok::Assign
    } else {
        AssignTok::Define
    };
    Stmt::Assign(AssignStmt {
        lhs: vec![Expr::ident(txn_var)],
        tok,
        rhs: vec![Expr::call(
            Expr::selector(Expr::ident(agent_var), "StartTransaction"),
            vec![Expr::string_lit(txn_name)],
        )],
        decs: Decorations::default(),
    })
}

pub fn end_transaction(txn_var: &str) -> Stmt {
    Stmt::expr(Expr::call(
        Expr::selector(Expr::ident(txn_var), "End"),
        vec![],
    ))
}

/// A `txn *newrelic.Transaction` parameter.
pub fn txn_as_parameter(txn_name: &str) -> Field {
    Field {
        names: vec![txn_name.to_string()],
        ty: Expr::Star(Box::new(Expr::qualified(
            "Transaction",
            NEWRELIC_AGENT_IMPORT,
        ))),
    }
}

/// `defer txn.StartSegment("<name>").End()`.
pub fn defer_segment(segment_name: &str, txn_var: &str) -> Stmt {
    Stmt::Defer(DeferStmt {
        call: Expr::call(
            Expr::selector(
                Expr::call(
                    Expr::selector(Expr::ident(txn_var), "StartSegment"),
                    vec![Expr::string_lit(segment_name)],
                ),
                "End",
            ),
            vec![],
        ),
        decs: Decorations::default(),
    })
}

/// `txn.NewGoroutine()`, the argument handed to each spawned goroutine.
pub fn txn_new_goroutine(txn_var: &str) -> Expr {
    Expr::call(Expr::selector(Expr::ident(txn_var), "NewGoroutine"), vec![])
}

/// `txn.NoticeError(err)`, taking over the trailing decorations of the
/// assignment it follows so comments stay below the pair.
pub fn notice_error(err_var: &str, txn_name: &str, src: &mut Decorations) -> Stmt {
    let mut decs = Decorations::default();
    move_trailing(src, &mut decs);
    Stmt::Expr(ExprStmt {
        x: Expr::call(
            Expr::selector(Expr::ident(txn_name), "NoticeError"),
            vec![Expr::ident(err_var)],
        ),
        decs,
    })
}

/// `txn := newrelic.FromContext(r.Context())` with a blank line after it, the
/// first statement of every instrumented handler.
pub fn txn_from_context(txn_var: &str) -> Stmt {
    Stmt::Assign(AssignStmt {
        lhs: vec![Expr::ident(txn_var)],
        tok: AssignTok::Define,
        rhs: vec![Expr::call(
            Expr::qualified("FromContext", NEWRELIC_AGENT_IMPORT),
            vec![Expr::call(
                Expr::selector(Expr::ident("r"), "Context"),
                vec![],
            )],
        )],
        decs: Decorations {
            after: Space::Empty,
            ..Default::default()
        },
    })
}

/// `client.Transport = newrelic.NewRoundTripper(client.Transport)`, inserted
/// after a client definition; the definition's trailing spacing moves here.
pub fn inject_round_tripper(client_var: &Expr, spacing_after: Space) -> Stmt {
    let transport = Expr::selector(client_var.clone(), "Transport");
    Stmt::Assign(AssignStmt {
        lhs: vec![transport.clone()],
        tok: AssignTok::Assign,
        rhs: vec![Expr::call(
            Expr::qualified("NewRoundTripper", NEWRELIC_AGENT_IMPORT),
            vec![transport],
        )],
        decs: Decorations {
            after: spacing_after,
            ..Default::default()
        },
    })
}

/// `seg := newrelic.StartExternalSegment(txn, request)`, taking over the
/// leading decorations of the wrapped statement.
pub fn start_external_segment(
    request: &Expr,
    txn_var: &str,
    segment_var: &str,
    src: &mut Decorations,
) -> Stmt {
    let mut decs = Decorations::default();
    move_leading(src, &mut decs);
    Stmt::Assign(AssignStmt {
        lhs: vec![Expr::ident(segment_var)],
        tok: AssignTok::Define,
        rhs: vec![Expr::call(
            Expr::qualified("StartExternalSegment", NEWRELIC_AGENT_IMPORT),
            vec![Expr::ident(txn_var), request.clone()],
        )],
        decs,
    })
}

/// `seg.Response = resp`.
pub fn capture_http_response(segment_var: &str, response: &Expr) -> Stmt {
    Stmt::Assign(AssignStmt {
        lhs: vec![Expr::selector(Expr::ident(segment_var), "Response")],
        tok: AssignTok::Assign,
        rhs: vec![response.clone()],
        decs: Decorations::default(),
    })
}

/// `seg.End()`, taking over the trailing decorations of the wrapped statement.
pub fn end_external_segment(segment_var: &str, src: &mut Decorations) -> Stmt {
    let mut decs = Decorations::default();
    move_trailing(src, &mut decs);
    Stmt::Expr(ExprStmt {
        x: Expr::call(Expr::selector(Expr::ident(segment_var), "End"), vec![]),
        decs,
    })
}

/// `request = newrelic.RequestWithTransactionContext(request, txn)`, placed
/// before a custom-client `Do` call; leading decorations migrate up.
pub fn request_with_txn_context(request: &Expr, txn_var: &str, src: &mut Decorations) -> Stmt {
    let mut decs = Decorations::default();
    move_leading(src, &mut decs);
    Stmt::Assign(AssignStmt {
        lhs: vec![request.clone()],
        tok: AssignTok::Assign,
        rhs: vec![Expr::call(
            Expr::qualified("RequestWithTransactionContext", NEWRELIC_AGENT_IMPORT),
            vec![request.clone(), Expr::ident(txn_var)],
        )],
        decs,
    })
}

/// The warning block placed above outbound calls that cannot carry a
/// transaction. A bare `//` separator is appended only when the statement
/// already had leading comments, so the warning reads as its own block.
pub fn cannot_trace_comment(method: &str, decs: &Decorations) -> Vec<String> {
    let mut comment = vec![
        format!(
            "// the \"http.{method}()\" net/http method can not be instrumented and its outbound traffic can not be traced"
        ),
        "// please see these examples of code patterns for external http calls that can be instrumented:".to_string(),
        "// https://docs.newrelic.com/docs/apm/agents/go-agent/configuration/distributed-tracing-go-agent/#make-http-requests".to_string(),
    ];
    if !decs.start.is_empty() {
        comment.push("//".to_string());
    }
    comment
}
