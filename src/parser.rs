use std::path::Path;

use crate::ast::{
    AssignStmt, AssignTok, Block, BranchStmt, CallExpr, Decl, Decorations, DeferStmt, ElseBranch,
    Expr, ExprStmt, Field, File, ForStmt, FuncDecl, FuncLit, FuncType, GoStmt, Ident, IfStmt,
    ImportSpec, IncDecStmt, LitKind, RangeStmt, ReturnStmt, Space, Stmt, TypeDef, VarDecl,
};
pub use crate::lexer::SyntaxError;
use crate::lexer::{self, TokKind, Token};

/// Parse one Go source file into a decorated AST.
///
/// `path` is recorded on the file for diagnostics and emission; it does not
/// need to exist on disk.
pub fn parse_file(path: &Path, source: &str) -> Result<File, SyntaxError> {
    let toks = lexer::scan(source)?;
    let mut p = Parser {
        toks,
        pos: 0,
        no_composite: 0,
    };
    p.file(path)
}

/// Parse a string of Go source, for tests and fixtures.
pub fn parse_source(name: &str, source: &str) -> Result<File, SyntaxError> {
    parse_file(Path::new(name), source)
}

enum Simple {
    Stmt(Stmt),
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        tok: AssignTok,
        x: Expr,
    },
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    /// Depth of control-clause contexts where a bare composite literal would
    /// be ambiguous with the statement block (Go disallows them there).
    no_composite: u32,
}

impl Parser {
    fn cur(&self) -> &Token {
        &self.toks[self.pos]
    }

    fn kind(&self) -> TokKind {
        self.toks[self.pos].kind
    }

    fn text(&self) -> &str {
        &self.toks[self.pos].text
    }

    fn bump(&mut self) -> &Token {
        let tok = &self.toks[self.pos];
        if tok.kind != TokKind::Eof {
            self.pos += 1;
        }
        &self.toks[self.pos - 1]
    }

    fn err(&self, message: impl Into<String>) -> SyntaxError {
        let t = self.cur();
        SyntaxError::new(t.line, t.col, message)
    }

    fn expect(&mut self, kind: TokKind, what: &str) -> Result<&Token, SyntaxError> {
        if self.kind() != kind {
            return Err(self.err(format!("expected {what}, found '{}'", self.cur().text)));
        }
        Ok(self.bump())
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, SyntaxError> {
        Ok(self.expect(TokKind::Ident, what)?.text.clone())
    }

    fn eat(&mut self, kind: TokKind) -> bool {
        if self.kind() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Pull the leading decorations (comments, blank line) off the token about
    /// to start a statement or declaration.
    fn start_decorations(&mut self) -> Decorations {
        let t = &mut self.toks[self.pos];
        Decorations {
            before: if t.blank_before {
                Space::Empty
            } else {
                Space::None
            },
            start: std::mem::take(&mut t.comments),
            after: Space::None,
            end: Vec::new(),
        }
    }

    /// Take the trailing same-line comment of the statement that just ended.
    /// It sits on the last real token, possibly one behind the inserted
    /// semicolon.
    fn take_trailing(&mut self) -> Vec<String> {
        for back in 1..=2 {
            if self.pos >= back
                && let Some(c) = self.toks[self.pos - back].trailing.take()
            {
                return vec![c];
            }
        }
        Vec::new()
    }

    fn file(&mut self, path: &Path) -> Result<File, SyntaxError> {
        let header = std::mem::take(&mut self.toks[self.pos].comments);
        self.expect(TokKind::Package, "package clause")?;
        let package = self.expect_ident("package name")?;
        self.eat(TokKind::Semi);

        let mut imports = Vec::new();
        while self.kind() == TokKind::Import {
            // Comments above import blocks are not tracked; drop them from
            // the token so they do not leak onto the next declaration.
            self.toks[self.pos].comments.clear();
            self.bump();
            if self.eat(TokKind::LParen) {
                while self.kind() != TokKind::RParen {
                    if self.eat(TokKind::Semi) {
                        continue;
                    }
                    imports.push(self.import_spec()?);
                }
                self.bump();
            } else {
                imports.push(self.import_spec()?);
            }
            self.eat(TokKind::Semi);
        }

        let mut decls = Vec::new();
        while self.kind() != TokKind::Eof {
            if self.eat(TokKind::Semi) {
                continue;
            }
            let decs = self.start_decorations();
            let mut decl = match self.kind() {
                TokKind::Func => self.func_decl()?,
                TokKind::Var => Decl::Var(self.var_decl()?),
                TokKind::Const => {
                    self.bump();
                    let d = self.var_spec()?;
                    Decl::Const(d)
                }
                TokKind::Type => Decl::Type(self.type_def()?),
                _ => return Err(self.err("expected a top-level declaration")),
            };
            *decl.decorations_mut() = decs;
            decls.push(decl);
            self.eat(TokKind::Semi);
        }

        Ok(File {
            path: path.to_path_buf(),
            package,
            header,
            imports,
            decls,
        })
    }

    fn import_spec(&mut self) -> Result<ImportSpec, SyntaxError> {
        let alias = if self.kind() == TokKind::Ident {
            Some(self.bump().text.clone())
        } else {
            None
        };
        let tok = self.expect(TokKind::Str, "import path")?;
        let path = tok.text.trim_matches('"').to_string();
        self.eat(TokKind::Semi);
        Ok(ImportSpec { alias, path })
    }

    fn func_decl(&mut self) -> Result<Decl, SyntaxError> {
        self.bump(); // func
        let recv = if self.kind() == TokKind::LParen {
            self.bump();
            let mut fields = self.field_list(TokKind::RParen)?;
            self.expect(TokKind::RParen, "')' after receiver")?;
            if fields.len() != 1 {
                return Err(self.err("method receiver must be a single parameter"));
            }
            Some(fields.remove(0))
        } else {
            None
        };
        let name = self.expect_ident("function name")?;
        let ty = self.func_type()?;
        let body = self.block()?;
        Ok(Decl::Func(FuncDecl {
            name,
            recv,
            ty,
            body,
            decs: Decorations::default(),
        }))
    }

    fn func_type(&mut self) -> Result<FuncType, SyntaxError> {
        self.expect(TokKind::LParen, "'(' before parameters")?;
        let params = self.field_list(TokKind::RParen)?;
        self.expect(TokKind::RParen, "')' after parameters")?;

        let results = if self.kind() == TokKind::LParen {
            self.bump();
            let list = self.field_list(TokKind::RParen)?;
            self.expect(TokKind::RParen, "')' after results")?;
            list
        } else if self.starts_type() {
            let ty = self.parse_type()?;
            vec![Field {
                names: Vec::new(),
                ty,
            }]
        } else {
            Vec::new()
        };

        Ok(FuncType { params, results })
    }

    fn starts_type(&self) -> bool {
        match self.kind() {
            TokKind::Ident
            | TokKind::LBrack
            | TokKind::Map
            | TokKind::Struct
            | TokKind::Func
            | TokKind::LParen => true,
            TokKind::Op => self.text() == "*",
            _ => false,
        }
    }

    /// Parse a parameter/result list up to (not including) `closer`, using the
    /// usual two-phase reading: entries are parsed as types, and reinterpreted
    /// as names once a following type proves the group was named.
    fn field_list(&mut self, closer: TokKind) -> Result<Vec<Field>, SyntaxError> {
        let mut fields: Vec<Field> = Vec::new();
        let mut pending: Vec<Expr> = Vec::new();

        while self.kind() != closer {
            let t = self.parse_type()?;
            if self.kind() == TokKind::Comma {
                pending.push(t);
                self.bump();
            } else if self.kind() == closer {
                pending.push(t);
                break;
            } else {
                let mut names = Vec::new();
                for e in pending.drain(..) {
                    names.push(Self::ident_name(e).ok_or_else(|| {
                        self.err("expected parameter name before type")
                    })?);
                }
                names.push(
                    Self::ident_name(t)
                        .ok_or_else(|| self.err("expected parameter name before type"))?,
                );
                let ty = self.parse_type()?;
                fields.push(Field { names, ty });
                if !self.eat(TokKind::Comma) {
                    break;
                }
            }
        }

        for e in pending {
            fields.push(Field {
                names: Vec::new(),
                ty: e,
            });
        }
        Ok(fields)
    }

    fn ident_name(e: Expr) -> Option<String> {
        match e {
            Expr::Ident(Ident { name, path: None }) => Some(name),
            _ => None,
        }
    }

    fn parse_type(&mut self) -> Result<Expr, SyntaxError> {
        match self.kind() {
            TokKind::Ident => {
                let name = self.bump().text.clone();
                if self.eat(TokKind::Dot) {
                    let sel = self.expect_ident("type name after '.'")?;
                    Ok(Expr::selector(Expr::ident(name), sel))
                } else {
                    Ok(Expr::ident(name))
                }
            }
            TokKind::Op if self.text() == "*" => {
                self.bump();
                Ok(Expr::Star(Box::new(self.parse_type()?)))
            }
            TokKind::LBrack => {
                self.bump();
                let len = if self.kind() == TokKind::RBrack {
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                };
                self.expect(TokKind::RBrack, "']' in array type")?;
                let elt = Box::new(self.parse_type()?);
                Ok(Expr::ArrayType { len, elt })
            }
            TokKind::Map => {
                self.bump();
                self.expect(TokKind::LBrack, "'[' after 'map'")?;
                let key = Box::new(self.parse_type()?);
                self.expect(TokKind::RBrack, "']' in map type")?;
                let value = Box::new(self.parse_type()?);
                Ok(Expr::MapType { key, value })
            }
            TokKind::Struct => self.struct_type(),
            TokKind::Func => {
                self.bump();
                Ok(Expr::FuncType(self.func_type()?))
            }
            TokKind::LParen => {
                self.bump();
                let inner = self.parse_type()?;
                self.expect(TokKind::RParen, "')' in type")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            _ => Err(self.err(format!("expected a type, found '{}'", self.cur().text))),
        }
    }

    fn struct_type(&mut self) -> Result<Expr, SyntaxError> {
        self.bump(); // struct
        self.expect(TokKind::LBrace, "'{' after 'struct'")?;
        let mut fields = Vec::new();
        while self.kind() != TokKind::RBrace {
            if self.eat(TokKind::Semi) {
                continue;
            }
            // Comments inside struct bodies are not preserved.
            self.toks[self.pos].comments.clear();
            let mut items = vec![self.parse_type()?];
            while self.eat(TokKind::Comma) {
                items.push(self.parse_type()?);
            }
            if matches!(self.kind(), TokKind::Semi | TokKind::RBrace) {
                for ty in items {
                    fields.push(Field {
                        names: Vec::new(),
                        ty,
                    });
                }
            } else {
                let ty = self.parse_type()?;
                let mut names = Vec::new();
                for e in items {
                    names.push(
                        Self::ident_name(e)
                            .ok_or_else(|| self.err("expected field name in struct"))?,
                    );
                }
                fields.push(Field { names, ty });
            }
            self.eat(TokKind::Semi);
        }
        self.bump(); // }
        Ok(Expr::StructType { fields })
    }

    fn block(&mut self) -> Result<Block, SyntaxError> {
        self.expect(TokKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while self.kind() != TokKind::RBrace {
            if self.kind() == TokKind::Eof {
                return Err(self.err("unexpected end of file in block"));
            }
            if self.eat(TokKind::Semi) {
                continue;
            }
            stmts.push(self.parse_stmt()?);
        }
        let tail_comments = std::mem::take(&mut self.toks[self.pos].comments);
        self.bump(); // }
        Ok(Block {
            stmts,
            tail_comments,
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let lead = self.start_decorations();
        let mut stmt = self.stmt_inner()?;
        if self.kind() == TokKind::Semi {
            self.bump();
        }
        let end = self.take_trailing();
        let decs = stmt.decorations_mut();
        decs.before = lead.before;
        decs.start = lead.start;
        decs.end = end;
        Ok(stmt)
    }

    fn stmt_inner(&mut self) -> Result<Stmt, SyntaxError> {
        match self.kind() {
            TokKind::Return => {
                self.bump();
                let results = if matches!(self.kind(), TokKind::Semi | TokKind::RBrace) {
                    Vec::new()
                } else {
                    self.expr_list()?
                };
                Ok(Stmt::Return(ReturnStmt {
                    results,
                    decs: Decorations::default(),
                }))
            }
            TokKind::If => Ok(Stmt::If(self.if_stmt()?)),
            TokKind::For => self.for_stmt(),
            TokKind::Go => {
                self.bump();
                let call = self.parse_expr()?;
                if !matches!(call, Expr::Call(_)) {
                    return Err(self.err("expression in go statement must be a call"));
                }
                Ok(Stmt::Go(GoStmt {
                    call,
                    decs: Decorations::default(),
                }))
            }
            TokKind::Defer => {
                self.bump();
                let call = self.parse_expr()?;
                if !matches!(call, Expr::Call(_)) {
                    return Err(self.err("expression in defer statement must be a call"));
                }
                Ok(Stmt::Defer(DeferStmt {
                    call,
                    decs: Decorations::default(),
                }))
            }
            TokKind::Var => Ok(Stmt::Var(self.var_decl()?)),
            TokKind::Type => Ok(Stmt::Type(self.type_def()?)),
            TokKind::LBrace => {
                let block = self.block()?;
                Ok(Stmt::Block(block, Decorations::default()))
            }
            TokKind::Break | TokKind::Continue => {
                let tok = self.bump().text.clone();
                let label = if self.kind() == TokKind::Ident {
                    Some(self.bump().text.clone())
                } else {
                    None
                };
                Ok(Stmt::Branch(BranchStmt {
                    tok,
                    label,
                    decs: Decorations::default(),
                }))
            }
            _ => match self.simple_stmt(false)? {
                Simple::Stmt(s) => Ok(s),
                Simple::Range { .. } => Err(self.err("range outside of for statement")),
            },
        }
    }

    fn simple_stmt(&mut self, allow_range: bool) -> Result<Simple, SyntaxError> {
        let lhs = self.expr_list()?;
        match self.kind() {
            TokKind::Define | TokKind::Assign => {
                let tok = if self.kind() == TokKind::Define {
                    AssignTok::Define
                } else {
                    AssignTok::Assign
                };
                self.bump();
                if allow_range && self.kind() == TokKind::Range {
                    self.bump();
                    let x = self.parse_expr()?;
                    let mut it = lhs.into_iter();
                    return Ok(Simple::Range {
                        key: it.next(),
                        value: it.next(),
                        tok,
                        x,
                    });
                }
                let rhs = self.expr_list()?;
                Ok(Simple::Stmt(Stmt::Assign(AssignStmt {
                    lhs,
                    tok,
                    rhs,
                    decs: Decorations::default(),
                })))
            }
            TokKind::OpAssign => {
                let op = self.bump().text.clone();
                let rhs = self.expr_list()?;
                Ok(Simple::Stmt(Stmt::Assign(AssignStmt {
                    lhs,
                    tok: AssignTok::Compound(op),
                    rhs,
                    decs: Decorations::default(),
                })))
            }
            TokKind::Inc | TokKind::Dec => {
                let op = self.bump().text.clone();
                let mut lhs = lhs;
                if lhs.len() != 1 {
                    return Err(self.err("invalid operand for increment statement"));
                }
                Ok(Simple::Stmt(Stmt::IncDec(IncDecStmt {
                    x: lhs.remove(0),
                    op,
                    decs: Decorations::default(),
                })))
            }
            _ => {
                let mut lhs = lhs;
                if lhs.len() != 1 {
                    return Err(self.err("expected assignment after expression list"));
                }
                Ok(Simple::Stmt(Stmt::Expr(ExprStmt {
                    x: lhs.remove(0),
                    decs: Decorations::default(),
                })))
            }
        }
    }

    fn if_stmt(&mut self) -> Result<IfStmt, SyntaxError> {
        self.bump(); // if
        self.no_composite += 1;
        let first = self.simple_stmt(false)?;
        let (init, cond) = if self.kind() == TokKind::Semi {
            self.bump();
            let cond = self.parse_expr()?;
            match first {
                Simple::Stmt(s) => (Some(Box::new(s)), cond),
                Simple::Range { .. } => {
                    self.no_composite -= 1;
                    return Err(self.err("range clause not allowed in if statement"));
                }
            }
        } else {
            match first {
                Simple::Stmt(Stmt::Expr(e)) => (None, e.x),
                _ => {
                    self.no_composite -= 1;
                    return Err(self.err("missing condition in if statement"));
                }
            }
        };
        self.no_composite -= 1;

        let body = self.block()?;
        let els = if self.eat(TokKind::Else) {
            if self.kind() == TokKind::If {
                Some(ElseBranch::If(Box::new(self.if_stmt()?)))
            } else {
                Some(ElseBranch::Block(self.block()?))
            }
        } else {
            None
        };

        Ok(IfStmt {
            init,
            cond,
            body,
            els,
            decs: Decorations::default(),
        })
    }

    fn for_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        self.bump(); // for
        if self.kind() == TokKind::LBrace {
            let body = self.block()?;
            return Ok(Stmt::For(ForStmt {
                init: None,
                cond: None,
                post: None,
                body,
                decs: Decorations::default(),
            }));
        }

        self.no_composite += 1;
        if self.kind() == TokKind::Range {
            self.bump();
            let x = self.parse_expr()?;
            self.no_composite -= 1;
            let body = self.block()?;
            return Ok(Stmt::Range(RangeStmt {
                key: None,
                value: None,
                tok: AssignTok::Assign,
                x,
                body,
                decs: Decorations::default(),
            }));
        }

        let first = self.simple_stmt(true)?;
        let stmt = match first {
            Simple::Range { key, value, tok, x } => {
                self.no_composite -= 1;
                let body = self.block()?;
                Stmt::Range(RangeStmt {
                    key,
                    value,
                    tok,
                    x,
                    body,
                    decs: Decorations::default(),
                })
            }
            Simple::Stmt(s) => {
                if self.kind() == TokKind::Semi {
                    self.bump();
                    let cond = if self.kind() == TokKind::Semi {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.expect(TokKind::Semi, "';' in for clause")?;
                    let post = if self.kind() == TokKind::LBrace {
                        None
                    } else {
                        match self.simple_stmt(false)? {
                            Simple::Stmt(p) => Some(Box::new(p)),
                            Simple::Range { .. } => {
                                self.no_composite -= 1;
                                return Err(self.err("range clause not allowed here"));
                            }
                        }
                    };
                    self.no_composite -= 1;
                    let body = self.block()?;
                    Stmt::For(ForStmt {
                        init: Some(Box::new(s)),
                        cond,
                        post,
                        body,
                        decs: Decorations::default(),
                    })
                } else {
                    let cond = match s {
                        Stmt::Expr(e) => e.x,
                        _ => {
                            self.no_composite -= 1;
                            return Err(self.err("missing condition in for statement"));
                        }
                    };
                    self.no_composite -= 1;
                    let body = self.block()?;
                    Stmt::For(ForStmt {
                        init: None,
                        cond: Some(cond),
                        post: None,
                        body,
                        decs: Decorations::default(),
                    })
                }
            }
        };
        Ok(stmt)
    }

    fn var_decl(&mut self) -> Result<VarDecl, SyntaxError> {
        self.bump(); // var
        self.var_spec()
    }

    /// Shared body of `var` and `const` declarations: names, optional type,
    /// optional initializer list.
    fn var_spec(&mut self) -> Result<VarDecl, SyntaxError> {
        let mut names = vec![self.expect_ident("variable name")?];
        while self.eat(TokKind::Comma) {
            names.push(self.expect_ident("variable name")?);
        }
        let ty = if self.kind() != TokKind::Assign && self.starts_type() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let values = if self.eat(TokKind::Assign) {
            self.expr_list()?
        } else {
            Vec::new()
        };
        Ok(VarDecl {
            names,
            ty,
            values,
            decs: Decorations::default(),
        })
    }

    fn type_def(&mut self) -> Result<TypeDef, SyntaxError> {
        self.bump(); // type
        let name = self.expect_ident("type name")?;
        let ty = self.parse_type()?;
        Ok(TypeDef {
            name,
            ty,
            decs: Decorations::default(),
        })
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut list = vec![self.parse_expr()?];
        while self.eat(TokKind::Comma) {
            list.push(self.parse_expr()?);
        }
        Ok(list)
    }

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(1)
    }

    fn binary_prec(&self) -> Option<u8> {
        if self.kind() != TokKind::Op {
            return None;
        }
        Some(match self.text() {
            "||" => 1,
            "&&" => 2,
            "==" | "!=" | "<" | "<=" | ">" | ">=" => 3,
            "+" | "-" | "|" | "^" => 4,
            "*" | "/" | "%" | "&" | "<<" | ">>" => 5,
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;
        while let Some(prec) = self.binary_prec() {
            if prec < min_prec {
                break;
            }
            let op = self.bump().text.clone();
            let right = self.parse_binary(prec + 1)?;
            left = Expr::Binary {
                x: Box::new(left),
                op,
                y: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.kind() == TokKind::Op
            && matches!(self.text(), "&" | "!" | "-" | "+" | "*" | "<-")
        {
            let op = self.bump().text.clone();
            let x = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                x: Box::new(x),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_operand()?;
        loop {
            match self.kind() {
                TokKind::Dot => {
                    self.bump();
                    let sel = self.expect_ident("selector name")?;
                    expr = Expr::Selector {
                        x: Box::new(expr),
                        sel,
                    };
                }
                TokKind::LParen => {
                    self.bump();
                    let saved = self.no_composite;
                    self.no_composite = 0;
                    let args = if self.kind() == TokKind::RParen {
                        Vec::new()
                    } else {
                        self.expr_list()?
                    };
                    self.no_composite = saved;
                    self.expect(TokKind::RParen, "')' after arguments")?;
                    expr = Expr::Call(CallExpr {
                        fun: Box::new(expr),
                        args,
                    });
                }
                TokKind::LBrack => {
                    self.bump();
                    let saved = self.no_composite;
                    self.no_composite = 0;
                    let low = if matches!(self.kind(), TokKind::Colon) {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    if self.eat(TokKind::Colon) {
                        let high = if self.kind() == TokKind::RBrack {
                            None
                        } else {
                            Some(Box::new(self.parse_expr()?))
                        };
                        self.no_composite = saved;
                        self.expect(TokKind::RBrack, "']' after slice")?;
                        expr = Expr::Slice {
                            x: Box::new(expr),
                            low: low.map(Box::new),
                            high,
                        };
                    } else {
                        self.no_composite = saved;
                        self.expect(TokKind::RBrack, "']' after index")?;
                        let index = low.ok_or_else(|| self.err("missing index expression"))?;
                        expr = Expr::Index {
                            x: Box::new(expr),
                            index: Box::new(index),
                        };
                    }
                }
                TokKind::LBrace if self.no_composite == 0 && Self::is_type_expr(&expr) => {
                    expr = self.composite_lit(expr)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn is_type_expr(e: &Expr) -> bool {
        matches!(
            e,
            Expr::Ident(_)
                | Expr::Selector { .. }
                | Expr::ArrayType { .. }
                | Expr::MapType { .. }
                | Expr::StructType { .. }
        )
    }

    fn composite_lit(&mut self, ty: Expr) -> Result<Expr, SyntaxError> {
        let open_line = self.cur().line;
        self.bump(); // {
        let saved = self.no_composite;
        self.no_composite = 0;
        let mut elts = Vec::new();
        while self.kind() != TokKind::RBrace {
            if self.eat(TokKind::Semi) || self.eat(TokKind::Comma) {
                continue;
            }
            // Comments inside composite literals are not preserved.
            self.toks[self.pos].comments.clear();
            let e = self.parse_expr()?;
            let e = if self.eat(TokKind::Colon) {
                let value = self.parse_expr()?;
                Expr::KeyValue {
                    key: Box::new(e),
                    value: Box::new(value),
                }
            } else {
                e
            };
            elts.push(e);
        }
        self.no_composite = saved;
        let close_line = self.cur().line;
        self.bump(); // }
        Ok(Expr::CompositeLit {
            ty: Some(Box::new(ty)),
            elts,
            multiline: close_line != open_line,
        })
    }

    fn parse_operand(&mut self) -> Result<Expr, SyntaxError> {
        match self.kind() {
            TokKind::Ident => {
                let name = self.bump().text.clone();
                Ok(Expr::ident(name))
            }
            TokKind::Int => Ok(self.lit(LitKind::Int)),
            TokKind::Float => Ok(self.lit(LitKind::Float)),
            TokKind::Str => Ok(self.lit(LitKind::String)),
            TokKind::Char => Ok(self.lit(LitKind::Char)),
            TokKind::LParen => {
                self.bump();
                let saved = self.no_composite;
                self.no_composite = 0;
                let inner = self.parse_expr()?;
                self.no_composite = saved;
                self.expect(TokKind::RParen, "')'")?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokKind::Func => {
                self.bump();
                let ty = self.func_type()?;
                if self.kind() == TokKind::LBrace {
                    let saved = self.no_composite;
                    self.no_composite = 0;
                    let body = self.block()?;
                    self.no_composite = saved;
                    Ok(Expr::FuncLit(FuncLit { ty, body }))
                } else {
                    Ok(Expr::FuncType(ty))
                }
            }
            TokKind::LBrack | TokKind::Map | TokKind::Struct => self.parse_type(),
            _ => Err(self.err(format!(
                "expected an expression, found '{}'",
                self.cur().text
            ))),
        }
    }

    fn lit(&mut self, kind: LitKind) -> Expr {
        let value = self.bump().text.clone();
        Expr::BasicLit { kind, value }
    }
}
