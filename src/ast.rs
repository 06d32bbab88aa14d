use std::path::PathBuf;

/// Vertical spacing attached to a node edge, mirroring the decoration model of
/// comment-preserving Go formatters: `Empty` is a full blank line, `Newline`
/// is an ordinary line break, `None` is no recorded spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Space {
    #[default]
    None,
    Newline,
    Empty,
}

/// Blank lines and `//` comments attached to a statement or declaration.
///
/// `start` holds leading comment lines (full text including the `//`), `end`
/// holds the trailing same-line comment, and `before`/`after` record blank
/// lines around the node. Rewrites migrate these with [`move_leading`] and
/// [`move_trailing`] so comments stay visually attached to the right code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decorations {
    pub before: Space,
    pub start: Vec<String>,
    pub after: Space,
    pub end: Vec<String>,
}

/// Move the leading decorations (blank-line marker and leading comments) from
/// `src` onto `dst`, clearing them on `src`.
pub fn move_leading(src: &mut Decorations, dst: &mut Decorations) {
    dst.before = src.before;
    dst.start = std::mem::take(&mut src.start);
    src.before = Space::None;
}

/// Move the trailing decorations (blank-line marker and same-line comment)
/// from `src` onto `dst`, clearing them on `src`.
pub fn move_trailing(src: &mut Decorations, dst: &mut Decorations) {
    dst.after = src.after;
    dst.end = std::mem::take(&mut src.end);
    src.after = Space::None;
}

/// An identifier, optionally qualified with the import path of the package it
/// refers to. Qualified identifiers are produced by the resolver for selector
/// expressions over import aliases (`http.Get` becomes `Get` with path
/// `net/http`) and are restored to `alias.name` form on emission, with the
/// path merged into the file's imports.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub path: Option<String>,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Ident {
            name: name.into(),
            path: None,
        }
    }

    pub fn qualified(name: impl Into<String>, path: impl Into<String>) -> Self {
        Ident {
            name: name.into(),
            path: Some(path.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LitKind {
    Int,
    Float,
    String,
    Char,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub fun: Box<Expr>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub params: Vec<Field>,
    pub results: Vec<Field>,
}

/// A parameter, result, or struct field group: zero or more names and a type.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub names: Vec<String>,
    pub ty: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncLit {
    pub ty: FuncType,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(Ident),
    Selector {
        x: Box<Expr>,
        sel: String,
    },
    Call(CallExpr),
    BasicLit {
        kind: LitKind,
        value: String,
    },
    /// `T{...}` or `T{k: v, ...}`; `multiline` records whether the source
    /// spread the elements over multiple lines.
    CompositeLit {
        ty: Option<Box<Expr>>,
        elts: Vec<Expr>,
        multiline: bool,
    },
    KeyValue {
        key: Box<Expr>,
        value: Box<Expr>,
    },
    Unary {
        op: String,
        x: Box<Expr>,
    },
    Binary {
        x: Box<Expr>,
        op: String,
        y: Box<Expr>,
    },
    /// `*T` in type position or a pointer dereference.
    Star(Box<Expr>),
    Paren(Box<Expr>),
    Index {
        x: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        x: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
    },
    /// `func(...) ...` in type position.
    FuncType(FuncType),
    /// `[]T` or `[N]T`.
    ArrayType {
        len: Option<Box<Expr>>,
        elt: Box<Expr>,
    },
    MapType {
        key: Box<Expr>,
        value: Box<Expr>,
    },
    StructType {
        fields: Vec<Field>,
    },
    FuncLit(FuncLit),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(Ident::new(name))
    }

    pub fn qualified(name: impl Into<String>, path: impl Into<String>) -> Expr {
        Expr::Ident(Ident::qualified(name, path))
    }

    pub fn selector(x: Expr, sel: impl Into<String>) -> Expr {
        Expr::Selector {
            x: Box::new(x),
            sel: sel.into(),
        }
    }

    pub fn call(fun: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call(CallExpr {
            fun: Box::new(fun),
            args,
        })
    }

    pub fn string_lit(text: &str) -> Expr {
        Expr::BasicLit {
            kind: LitKind::String,
            value: format!("\"{text}\""),
        }
    }

    pub fn int_lit(value: impl std::fmt::Display) -> Expr {
        Expr::BasicLit {
            kind: LitKind::Int,
            value: value.to_string(),
        }
    }

    /// The identifier name if this expression is a bare, unqualified ident.
    pub fn as_bare_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(Ident { name, path: None }) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    /// Comments sitting between the last statement and the closing brace.
    pub tail_comments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignTok {
    /// `:=`
    Define,
    /// `=`
    Assign,
    /// `+=`, `-=`, and friends; the operator text is carried verbatim.
    Compound(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignStmt {
    pub lhs: Vec<Expr>,
    pub tok: AssignTok,
    pub rhs: Vec<Expr>,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmt {
    pub x: Expr,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    If(Box<IfStmt>),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub init: Option<Box<Stmt>>,
    pub cond: Expr,
    pub body: Block,
    pub els: Option<ElseBranch>,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub init: Option<Box<Stmt>>,
    pub cond: Option<Expr>,
    pub post: Option<Box<Stmt>>,
    pub body: Block,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeStmt {
    pub key: Option<Expr>,
    pub value: Option<Expr>,
    pub tok: AssignTok,
    pub x: Expr,
    pub body: Block,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub results: Vec<Expr>,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeferStmt {
    pub call: Expr,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoStmt {
    pub call: Expr,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncDecStmt {
    pub x: Expr,
    /// `"++"` or `"--"`.
    pub op: String,
    pub decs: Decorations,
}

/// `break` or `continue`, with an optional label.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchStmt {
    pub tok: String,
    pub label: Option<String>,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub names: Vec<String>,
    pub ty: Option<Expr>,
    pub values: Vec<Expr>,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub ty: Expr,
    pub decs: Decorations,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(AssignStmt),
    Expr(ExprStmt),
    If(IfStmt),
    For(ForStmt),
    Range(RangeStmt),
    Return(ReturnStmt),
    Defer(DeferStmt),
    Go(GoStmt),
    IncDec(IncDecStmt),
    Var(VarDecl),
    Type(TypeDef),
    Branch(BranchStmt),
    Block(Block, Decorations),
}

impl Stmt {
    pub fn decorations(&self) -> &Decorations {
        match self {
            Stmt::Assign(s) => &s.decs,
            Stmt::Expr(s) => &s.decs,
            Stmt::If(s) => &s.decs,
            Stmt::For(s) => &s.decs,
            Stmt::Range(s) => &s.decs,
            Stmt::Return(s) => &s.decs,
            Stmt::Defer(s) => &s.decs,
            Stmt::Go(s) => &s.decs,
            Stmt::IncDec(s) => &s.decs,
            Stmt::Var(s) => &s.decs,
            Stmt::Type(s) => &s.decs,
            Stmt::Branch(s) => &s.decs,
            Stmt::Block(_, decs) => decs,
        }
    }

    pub fn decorations_mut(&mut self) -> &mut Decorations {
        match self {
            Stmt::Assign(s) => &mut s.decs,
            Stmt::Expr(s) => &mut s.decs,
            Stmt::If(s) => &mut s.decs,
            Stmt::For(s) => &mut s.decs,
            Stmt::Range(s) => &mut s.decs,
            Stmt::Return(s) => &mut s.decs,
            Stmt::Defer(s) => &mut s.decs,
            Stmt::Go(s) => &mut s.decs,
            Stmt::IncDec(s) => &mut s.decs,
            Stmt::Var(s) => &mut s.decs,
            Stmt::Type(s) => &mut s.decs,
            Stmt::Branch(s) => &mut s.decs,
            Stmt::Block(_, decs) => decs,
        }
    }

    /// Expression statement wrapping a call, the workhorse of generated code.
    pub fn expr(x: Expr) -> Stmt {
        Stmt::Expr(ExprStmt {
            x,
            decs: Decorations::default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub recv: Option<Field>,
    pub ty: FuncType,
    pub body: Block,
    pub decs: Decorations,
}

impl FuncDecl {
    /// Receiver-qualified name used as the index key: methods are recorded as
    /// `(Recv).name`, free functions under their bare name.
    pub fn qualified_name(&self) -> String {
        match &self.recv {
            Some(recv) => format!("({}).{}", type_text(&recv.ty), self.name),
            None => self.name.clone(),
        }
    }
}

/// Compact textual rendering of a type expression, used for receiver
/// qualification and diagnostics.
pub fn type_text(ty: &Expr) -> String {
    match ty {
        Expr::Ident(Ident { name, path: None }) => name.clone(),
        Expr::Ident(Ident {
            name,
            path: Some(path),
        }) => format!("{path}.{name}"),
        Expr::Selector { x, sel } => format!("{}.{sel}", type_text(x)),
        Expr::Star(x) => format!("*{}", type_text(x)),
        Expr::ArrayType { len: None, elt } => format!("[]{}", type_text(elt)),
        _ => "_".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpec {
    pub alias: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Func(FuncDecl),
    Var(VarDecl),
    Const(VarDecl),
    Type(TypeDef),
}

impl Decl {
    pub fn decorations_mut(&mut self) -> &mut Decorations {
        match self {
            Decl::Func(d) => &mut d.decs,
            Decl::Var(d) | Decl::Const(d) => &mut d.decs,
            Decl::Type(d) => &mut d.decs,
        }
    }
}

/// One parsed Go source file with its decorations intact.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    /// Path relative to the project root.
    pub path: PathBuf,
    pub package: String,
    /// Comment lines above the `package` clause.
    pub header: Vec<String>,
    pub imports: Vec<ImportSpec>,
    pub decls: Vec<Decl>,
}

/// Visit every expression belonging to `stmt` itself: assignment sides, call
/// arguments, `if`/`for` clauses and so on. Does not descend into nested
/// statement blocks or function literal bodies; those are separate statement
/// scopes handled by the tracer's own recursion.
pub fn inspect_stmt_exprs<'a>(stmt: &'a Stmt, f: &mut dyn FnMut(&'a Expr)) {
    match stmt {
        Stmt::Assign(s) => {
            for e in s.lhs.iter().chain(s.rhs.iter()) {
                inspect_expr(e, f);
            }
        }
        Stmt::Expr(s) => inspect_expr(&s.x, f),
        Stmt::If(s) => {
            if let Some(init) = &s.init {
                inspect_stmt_exprs(init, f);
            }
            inspect_expr(&s.cond, f);
        }
        Stmt::For(s) => {
            if let Some(init) = &s.init {
                inspect_stmt_exprs(init, f);
            }
            if let Some(cond) = &s.cond {
                inspect_expr(cond, f);
            }
            if let Some(post) = &s.post {
                inspect_stmt_exprs(post, f);
            }
        }
        Stmt::Range(s) => inspect_expr(&s.x, f),
        Stmt::Return(s) => {
            for e in &s.results {
                inspect_expr(e, f);
            }
        }
        Stmt::Defer(s) => inspect_expr(&s.call, f),
        Stmt::Go(s) => inspect_expr(&s.call, f),
        Stmt::IncDec(s) => inspect_expr(&s.x, f),
        Stmt::Var(s) => {
            for e in &s.values {
                inspect_expr(e, f);
            }
        }
        Stmt::Type(_) | Stmt::Branch(_) | Stmt::Block(..) => {}
    }
}

/// Recursively visit `e` and its sub-expressions. Function literal bodies are
/// not entered.
pub fn inspect_expr<'a>(e: &'a Expr, f: &mut dyn FnMut(&'a Expr)) {
    f(e);
    match e {
        Expr::Selector { x, .. } => inspect_expr(x, f),
        Expr::Call(c) => {
            inspect_expr(&c.fun, f);
            for a in &c.args {
                inspect_expr(a, f);
            }
        }
        Expr::CompositeLit { ty, elts, .. } => {
            if let Some(ty) = ty {
                inspect_expr(ty, f);
            }
            for e in elts {
                inspect_expr(e, f);
            }
        }
        Expr::KeyValue { key, value } => {
            inspect_expr(key, f);
            inspect_expr(value, f);
        }
        Expr::Unary { x, .. } | Expr::Star(x) | Expr::Paren(x) => inspect_expr(x, f),
        Expr::Binary { x, y, .. } => {
            inspect_expr(x, f);
            inspect_expr(y, f);
        }
        Expr::Index { x, index } => {
            inspect_expr(x, f);
            inspect_expr(index, f);
        }
        Expr::Slice { x, low, high } => {
            inspect_expr(x, f);
            if let Some(low) = low {
                inspect_expr(low, f);
            }
            if let Some(high) = high {
                inspect_expr(high, f);
            }
        }
        Expr::ArrayType { len, elt } => {
            if let Some(len) = len {
                inspect_expr(len, f);
            }
            inspect_expr(elt, f);
        }
        Expr::MapType { key, value } => {
            inspect_expr(key, f);
            inspect_expr(value, f);
        }
        Expr::Ident(_)
        | Expr::BasicLit { .. }
        | Expr::StructType { .. }
        | Expr::FuncType(_)
        | Expr::FuncLit(_) => {}
    }
}

/// Mutably visit every call expression in `stmt`, children first. Same scope
/// rules as [`inspect_stmt_exprs`].
pub fn for_each_call_mut(stmt: &mut Stmt, f: &mut dyn FnMut(&mut CallExpr)) {
    match stmt {
        Stmt::Assign(s) => {
            for e in s.lhs.iter_mut().chain(s.rhs.iter_mut()) {
                walk_calls_mut(e, f);
            }
        }
        Stmt::Expr(s) => walk_calls_mut(&mut s.x, f),
        Stmt::If(s) => {
            if let Some(init) = &mut s.init {
                for_each_call_mut(init, f);
            }
            walk_calls_mut(&mut s.cond, f);
        }
        Stmt::For(s) => {
            if let Some(init) = &mut s.init {
                for_each_call_mut(init, f);
            }
            if let Some(cond) = &mut s.cond {
                walk_calls_mut(cond, f);
            }
            if let Some(post) = &mut s.post {
                for_each_call_mut(post, f);
            }
        }
        Stmt::Range(s) => walk_calls_mut(&mut s.x, f),
        Stmt::Return(s) => {
            for e in &mut s.results {
                walk_calls_mut(e, f);
            }
        }
        Stmt::Defer(s) => walk_calls_mut(&mut s.call, f),
        Stmt::Go(s) => walk_calls_mut(&mut s.call, f),
        Stmt::IncDec(s) => walk_calls_mut(&mut s.x, f),
        Stmt::Var(s) => {
            for e in &mut s.values {
                walk_calls_mut(e, f);
            }
        }
        Stmt::Type(_) | Stmt::Branch(_) | Stmt::Block(..) => {}
    }
}

fn walk_calls_mut(e: &mut Expr, f: &mut dyn FnMut(&mut CallExpr)) {
    match e {
        Expr::Call(c) => {
            walk_calls_mut(&mut c.fun, f);
            for a in &mut c.args {
                walk_calls_mut(a, f);
            }
            f(c);
        }
        Expr::Selector { x, .. } => walk_calls_mut(x, f),
        Expr::CompositeLit { ty, elts, .. } => {
            if let Some(ty) = ty {
                walk_calls_mut(ty, f);
            }
            for e in elts {
                walk_calls_mut(e, f);
            }
        }
        Expr::KeyValue { key, value } => {
            walk_calls_mut(key, f);
            walk_calls_mut(value, f);
        }
        Expr::Unary { x, .. } | Expr::Star(x) | Expr::Paren(x) => walk_calls_mut(x, f),
        Expr::Binary { x, y, .. } => {
            walk_calls_mut(x, f);
            walk_calls_mut(y, f);
        }
        Expr::Index { x, index } => {
            walk_calls_mut(x, f);
            walk_calls_mut(index, f);
        }
        Expr::Slice { x, low, high } => {
            walk_calls_mut(x, f);
            if let Some(low) = low {
                walk_calls_mut(low, f);
            }
            if let Some(high) = high {
                walk_calls_mut(high, f);
            }
        }
        Expr::ArrayType { len, elt } => {
            if let Some(len) = len {
                walk_calls_mut(len, f);
            }
            walk_calls_mut(elt, f);
        }
        Expr::MapType { key, value } => {
            walk_calls_mut(key, f);
            walk_calls_mut(value, f);
        }
        Expr::Ident(_)
        | Expr::BasicLit { .. }
        | Expr::StructType { .. }
        | Expr::FuncType(_)
        | Expr::FuncLit(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_leading_transfers_and_clears() {
        let mut src = Decorations {
            before: Space::Empty,
            start: vec!["// keep me".to_string()],
            ..Default::default()
        };
        let mut dst = Decorations::default();

        move_leading(&mut src, &mut dst);

        assert_eq!(dst.before, Space::Empty);
        assert_eq!(dst.start, vec!["// keep me".to_string()]);
        assert_eq!(src.before, Space::None);
        assert!(src.start.is_empty(), "source comments should be cleared");
    }

    #[test]
    fn move_trailing_transfers_and_clears() {
        let mut src = Decorations {
            after: Space::Empty,
            end: vec!["// tail".to_string()],
            ..Default::default()
        };
        let mut dst = Decorations::default();

        move_trailing(&mut src, &mut dst);

        assert_eq!(dst.after, Space::Empty);
        assert_eq!(dst.end, vec!["// tail".to_string()]);
        assert_eq!(src.after, Space::None);
        assert!(src.end.is_empty());
    }

    #[test]
    fn inspect_skips_nested_blocks() {
        // if x() { y() } -- y() belongs to the nested block, not the if stmt.
        let stmt = Stmt::If(IfStmt {
            init: None,
            cond: Expr::call(Expr::ident("x"), vec![]),
            body: Block {
                stmts: vec![Stmt::expr(Expr::call(Expr::ident("y"), vec![]))],
                tail_comments: vec![],
            },
            els: None,
            decs: Decorations::default(),
        });

        let mut seen = Vec::new();
        inspect_stmt_exprs(&stmt, &mut |e| {
            if let Expr::Call(c) = e
                && let Some(name) = c.fun.as_bare_ident()
            {
                seen.push(name.to_string());
            }
        });

        assert_eq!(seen, vec!["x".to_string()]);
    }

    #[test]
    fn for_each_call_mut_visits_nested_calls() {
        // f(g()) -- both calls visited, children first.
        let mut stmt = Stmt::expr(Expr::call(
            Expr::ident("f"),
            vec![Expr::call(Expr::ident("g"), vec![])],
        ));

        let mut order = Vec::new();
        for_each_call_mut(&mut stmt, &mut |c| {
            if let Some(name) = c.fun.as_bare_ident() {
                order.push(name.to_string());
            }
        });

        assert_eq!(order, vec!["g".to_string(), "f".to_string()]);
    }

    #[test]
    fn method_names_are_receiver_qualified() {
        let decl = FuncDecl {
            name: "Process".to_string(),
            recv: Some(Field {
                names: vec!["s".to_string()],
                ty: Expr::Star(Box::new(Expr::ident("Server"))),
            }),
            ty: FuncType {
                params: vec![],
                results: vec![],
            },
            body: Block::default(),
            decs: Decorations::default(),
        };
        assert_eq!(decl.qualified_name(), "(*Server).Process");
    }
}
