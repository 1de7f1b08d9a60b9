//! Compiler: pest grammar in, bytecode out.
//!
//! Expressions parse through a Pratt precedence table into a small
//! tree, then emit stack code; statements compile directly off the
//! parse pairs. Forward jumps (if/else, loops, `goto`, switch tables,
//! try regions) are patched in a second pass over the emitted code.

use std::collections::HashMap;

use lazy_static::lazy_static;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Num, One, Zero};
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op as PrattOp, PrattParser};
use pest::Parser;

use crate::builtin;
use crate::code::{BinOp, DimSpec, Function, Op, PathStep, UnOp, VarRef};
use crate::engine::Engine;
use crate::errors::CalcError;
use crate::qmath;
use crate::value::Value;

#[derive(pest_derive::Parser)]
#[grammar = "calc.pest"]
struct CalcParser;

lazy_static! {
    static ref PRATT: PrattParser<Rule> = PrattParser::new()
        .op(PrattOp::infix(Rule::op_lor, Assoc::Left))
        .op(PrattOp::infix(Rule::op_land, Assoc::Left))
        .op(PrattOp::infix(Rule::op_eq, Assoc::Left)
            | PrattOp::infix(Rule::op_ne, Assoc::Left)
            | PrattOp::infix(Rule::op_lt, Assoc::Left)
            | PrattOp::infix(Rule::op_le, Assoc::Left)
            | PrattOp::infix(Rule::op_gt, Assoc::Left)
            | PrattOp::infix(Rule::op_ge, Assoc::Left))
        .op(PrattOp::infix(Rule::op_bor, Assoc::Left))
        .op(PrattOp::infix(Rule::op_xor, Assoc::Left))
        .op(PrattOp::infix(Rule::op_band, Assoc::Left))
        .op(PrattOp::infix(Rule::op_shl, Assoc::Left) | PrattOp::infix(Rule::op_shr, Assoc::Left))
        .op(PrattOp::infix(Rule::op_add, Assoc::Left) | PrattOp::infix(Rule::op_sub, Assoc::Left))
        .op(PrattOp::infix(Rule::op_mul, Assoc::Left)
            | PrattOp::infix(Rule::op_div, Assoc::Left)
            | PrattOp::infix(Rule::op_quo, Assoc::Left)
            | PrattOp::infix(Rule::op_mod, Assoc::Left))
        .op(PrattOp::infix(Rule::op_pow, Assoc::Right));
}

// ---- expression tree ------------------------------------------------

#[derive(Debug, Clone)]
enum Expr {
    Num(BigRational),
    Imag(BigRational),
    Str(Vec<u8>),
    Null,
    Var(String),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    LAnd(Box<Expr>, Box<Expr>),
    LOr(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(Box<Expr>, Option<BinOp>, Box<Expr>),
    IncDec {
        inc: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Call(String, Vec<Expr>),
    Index(Box<Expr>, Vec<Expr>),
    Field(Box<Expr>, String),
}

fn parse_err(msg: impl Into<String>) -> CalcError {
    CalcError::ParseFailed(msg.into())
}

fn parse_decimal(s: &str) -> Result<BigRational, CalcError> {
    // forms: 123, 1.25, .5, 1e9, 1.5e-3
    let (mantissa, exp) = match s.find(|c| c == 'e' || c == 'E') {
        Some(p) => {
            let e: i64 = s[p + 1..]
                .parse()
                .map_err(|_| parse_err(format!("bad exponent in '{}'", s)))?;
            (&s[..p], e)
        }
        None => (s, 0),
    };
    let (int_part, frac_part) = match mantissa.find('.') {
        Some(p) => (&mantissa[..p], &mantissa[p + 1..]),
        None => (mantissa, ""),
    };
    let digits = format!("{}{}", int_part, frac_part);
    let digits = if digits.is_empty() { "0".into() } else { digits };
    let n = BigInt::from_str_radix(&digits, 10)
        .map_err(|_| parse_err(format!("bad number '{}'", s)))?;
    let shift = exp - frac_part.len() as i64;
    let q = if shift >= 0 {
        BigRational::from_integer(n * qmath::pow10(shift as u32))
    } else {
        BigRational::new(n, qmath::pow10((-shift) as u32))
    };
    Ok(q)
}

fn parse_int_radix(s: &str, radix: u32) -> Result<BigRational, CalcError> {
    let body = &s[2..]; // past 0x / 0o / 0b
    let n = BigInt::from_str_radix(body, radix)
        .map_err(|_| parse_err(format!("bad literal '{}'", s)))?;
    Ok(BigRational::from_integer(n))
}

fn unescape(raw: &str) -> Vec<u8> {
    // raw includes the surrounding quotes
    let inner = &raw[1..raw.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut it = inner.bytes().peekable();
    while let Some(b) = it.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match it.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b't') => out.push(b'\t'),
            Some(b'r') => out.push(b'\r'),
            Some(b'0') => out.push(0),
            Some(b'\\') => out.push(b'\\'),
            Some(b'"') => out.push(b'"'),
            Some(b'x') => {
                let hi = it.next().and_then(|c| (c as char).to_digit(16));
                let lo = it.next().and_then(|c| (c as char).to_digit(16));
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push((hi * 16 + lo) as u8);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn build_expr(pair: Pair<Rule>) -> Result<Expr, CalcError> {
    match pair.as_rule() {
        Rule::expr => build_expr(pair.into_inner().next().unwrap()),
        Rule::assign => {
            let mut it = pair.into_inner();
            let lhs = build_expr(it.next().unwrap())?;
            match it.next() {
                None => Ok(lhs),
                Some(op_pair) => {
                    let rhs = build_expr(it.next().unwrap())?;
                    let op = match op_pair.as_str() {
                        "=" => None,
                        "+=" => Some(BinOp::Add),
                        "-=" => Some(BinOp::Sub),
                        "*=" => Some(BinOp::Mul),
                        "/=" => Some(BinOp::Div),
                        "//=" => Some(BinOp::Quo),
                        "%=" => Some(BinOp::Mod),
                        "**=" => Some(BinOp::Pow),
                        other => return Err(parse_err(format!("bad assignment '{}'", other))),
                    };
                    Ok(Expr::Assign(Box::new(lhs), op, Box::new(rhs)))
                }
            }
        }
        Rule::cond_expr => {
            let mut it = pair.into_inner();
            let cond = build_expr(it.next().unwrap())?;
            match it.next() {
                None => Ok(cond),
                Some(then_pair) => {
                    let then = build_expr(then_pair)?;
                    let other = build_expr(it.next().unwrap())?;
                    Ok(Expr::Ternary(
                        Box::new(cond),
                        Box::new(then),
                        Box::new(other),
                    ))
                }
            }
        }
        Rule::bin_expr => PRATT
            .map_primary(build_expr)
            .map_infix(|lhs, op, rhs| {
                let lhs = lhs?;
                let rhs = rhs?;
                Ok(match op.as_rule() {
                    Rule::op_lor => Expr::LOr(Box::new(lhs), Box::new(rhs)),
                    Rule::op_land => Expr::LAnd(Box::new(lhs), Box::new(rhs)),
                    r => {
                        let b = match r {
                            Rule::op_add => BinOp::Add,
                            Rule::op_sub => BinOp::Sub,
                            Rule::op_mul => BinOp::Mul,
                            Rule::op_div => BinOp::Div,
                            Rule::op_quo => BinOp::Quo,
                            Rule::op_mod => BinOp::Mod,
                            Rule::op_pow => BinOp::Pow,
                            Rule::op_eq => BinOp::Eq,
                            Rule::op_ne => BinOp::Ne,
                            Rule::op_lt => BinOp::Lt,
                            Rule::op_le => BinOp::Le,
                            Rule::op_gt => BinOp::Gt,
                            Rule::op_ge => BinOp::Ge,
                            Rule::op_band => BinOp::And,
                            Rule::op_bor => BinOp::Or,
                            Rule::op_xor => BinOp::Xor,
                            Rule::op_shl => BinOp::Shl,
                            Rule::op_shr => BinOp::Shr,
                            _ => return Err(parse_err("unexpected operator")),
                        };
                        Expr::Binary(b, Box::new(lhs), Box::new(rhs))
                    }
                })
            })
            .parse(pair.into_inner()),
        Rule::unary_expr => {
            let mut ops = Vec::new();
            let mut inner = None;
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::un_op => ops.push(p.as_str().to_string()),
                    _ => inner = Some(build_expr(p)?),
                }
            }
            let mut e = inner.ok_or_else(|| parse_err("empty expression"))?;
            for op in ops.into_iter().rev() {
                e = match op.as_str() {
                    "++" | "--" => Expr::IncDec {
                        inc: op == "++",
                        prefix: true,
                        target: Box::new(e),
                    },
                    "!" => Expr::Unary(UnOp::LNot, Box::new(e)),
                    "~" => Expr::Unary(UnOp::BitNot, Box::new(e)),
                    "-" => Expr::Unary(UnOp::Neg, Box::new(e)),
                    "+" => Expr::Unary(UnOp::Plus, Box::new(e)),
                    other => return Err(parse_err(format!("bad operator '{}'", other))),
                };
            }
            Ok(e)
        }
        Rule::postfix_expr => {
            let mut it = pair.into_inner();
            let mut e = build_expr(it.next().unwrap())?;
            for p in it {
                debug_assert_eq!(p.as_rule(), Rule::postfix);
                let p = p.into_inner().next().unwrap();
                e = match p.as_rule() {
                    Rule::call_args => {
                        let name = match e {
                            Expr::Var(name) => name,
                            _ => return Err(parse_err("only named functions can be called")),
                        };
                        let args = p
                            .into_inner()
                            .map(build_expr)
                            .collect::<Result<Vec<_>, _>>()?;
                        Expr::Call(name, args)
                    }
                    Rule::index_part => {
                        let keys = p
                            .into_inner()
                            .map(build_expr)
                            .collect::<Result<Vec<_>, _>>()?;
                        Expr::Index(Box::new(e), keys)
                    }
                    Rule::field_part => {
                        let name = p.into_inner().next().unwrap().as_str().to_string();
                        Expr::Field(Box::new(e), name)
                    }
                    Rule::post_incr | Rule::post_decr => Expr::IncDec {
                        inc: p.as_rule() == Rule::post_incr,
                        prefix: false,
                        target: Box::new(e),
                    },
                    _ => return Err(parse_err("bad postfix")),
                };
            }
            Ok(e)
        }
        Rule::primary => build_expr(pair.into_inner().next().unwrap()),
        Rule::paren => build_expr(pair.into_inner().next().unwrap()),
        Rule::int_lit => Ok(Expr::Num(parse_decimal(pair.as_str())?)),
        Rule::real_lit => Ok(Expr::Num(parse_decimal(pair.as_str())?)),
        Rule::hex_lit => Ok(Expr::Num(parse_int_radix(pair.as_str(), 16)?)),
        Rule::oct_lit => Ok(Expr::Num(parse_int_radix(pair.as_str(), 8)?)),
        Rule::bin_lit => Ok(Expr::Num(parse_int_radix(pair.as_str(), 2)?)),
        Rule::imag_lit => {
            let s = pair.as_str();
            let core = &s[..s.len() - 1];
            Ok(Expr::Imag(parse_decimal(core)?))
        }
        Rule::str_lit => Ok(Expr::Str(unescape(pair.as_str()))),
        Rule::null_lit => Ok(Expr::Null),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        r => Err(parse_err(format!("unexpected rule {:?}", r))),
    }
}

// ---- code builder ---------------------------------------------------

struct LoopCtx {
    breaks: Vec<usize>,
    continues: Vec<usize>,
    is_switch: bool,
}

struct FnBuilder {
    name: String,
    params: Vec<String>,
    locals: Vec<String>,
    code: Vec<Op>,
    consts: Vec<Value>,
    loops: Vec<LoopCtx>,
    labels: HashMap<String, usize>,
    gotos: Vec<(String, usize)>,
    statics: HashMap<String, usize>,
    hidden: usize,
}

impl FnBuilder {
    fn new(name: &str, params: Vec<String>) -> Self {
        let locals = params.clone();
        FnBuilder {
            name: name.to_string(),
            params,
            locals,
            code: Vec::new(),
            consts: Vec::new(),
            loops: Vec::new(),
            labels: HashMap::new(),
            gotos: Vec::new(),
            statics: HashMap::new(),
            hidden: 0,
        }
    }

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    fn add_const(&mut self, v: Value) -> usize {
        self.consts.push(v);
        self.consts.len() - 1
    }

    fn patch(&mut self, idx: usize, target: usize) {
        match &mut self.code[idx] {
            Op::Branch(t) | Op::BranchIfFalse(t) | Op::BranchIfTrue(t) | Op::Try(t) => {
                *t = target
            }
            _ => unreachable!("patching a non-branch opcode"),
        }
    }

    fn declare_local(&mut self, name: &str) -> usize {
        if let Some(i) = self.locals.iter().position(|l| l == name) {
            return i;
        }
        self.locals.push(name.to_string());
        self.locals.len() - 1
    }

    fn hidden_local(&mut self) -> usize {
        self.hidden += 1;
        self.locals.push(format!("#tmp{}", self.hidden));
        self.locals.len() - 1
    }

    fn local_slot(&self, name: &str) -> Option<usize> {
        self.locals.iter().position(|l| l == name)
    }

    fn finish(mut self) -> Result<Function, CalcError> {
        for (name, idx) in std::mem::take(&mut self.gotos) {
            let target = *self
                .labels
                .get(&name)
                .ok_or(CalcError::UndefinedLabel(name))?;
            self.patch(idx, target);
        }
        self.emit(Op::PushNull);
        self.emit(Op::Return);
        Ok(Function {
            name: self.name,
            params: self.params,
            local_count: self.locals.len(),
            code: self.code,
            consts: self.consts,
        })
    }
}

pub struct Compiler<'e> {
    eng: &'e mut Engine,
    f: FnBuilder,
    in_function: bool,
}

/// Compile a source fragment against the engine: function and object
/// definitions register as a side effect, remaining statements become
/// the anonymous entry function returned.
pub fn compile_program(eng: &mut Engine, src: &str) -> Result<Function, CalcError> {
    let mut pairs =
        CalcParser::parse(Rule::program, src).map_err(|e| parse_err(e.to_string()))?;
    let program = pairs.next().unwrap();
    let mut top = Compiler {
        eng,
        f: FnBuilder::new("*main*", Vec::new()),
        in_function: false,
    };
    for item in program.into_inner() {
        match item.as_rule() {
            Rule::define_stmt => top.compile_define(item)?,
            Rule::stmt => top.compile_stmt(item)?,
            Rule::EOI => {}
            r => return Err(parse_err(format!("unexpected item {:?}", r))),
        }
    }
    let main = top.f.finish()?;
    if top.eng.config.calc_debug & 1 != 0 {
        log::debug!("compiled:\n{}", main);
    }
    Ok(main)
}

impl<'e> Compiler<'e> {
    fn compile_define(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        let mut it = pair.into_inner();
        it.next(); // kw_define
        let name = it.next().unwrap().as_str().to_string();
        let special = matches!(
            name.as_str(),
            "list" | "iserr" | "errno" | "error" | "raise"
        );
        if special || builtin::lookup(&name).is_some() {
            return Err(CalcError::Redefinition(name));
        }
        let mut params = Vec::new();
        let mut body = None;
        for p in it {
            match p.as_rule() {
                Rule::param_list => {
                    params = p.into_inner().map(|x| x.as_str().to_string()).collect();
                }
                Rule::block => body = Some(p),
                _ => {}
            }
        }
        let body = body.ok_or_else(|| parse_err("function body missing"))?;
        let mut sub = Compiler {
            eng: &mut *self.eng,
            f: FnBuilder::new(&name, params),
            in_function: true,
        };
        for s in body.into_inner() {
            sub.compile_stmt(s)?;
        }
        let func = sub.f.finish()?;
        if self.eng.config.calc_debug & 1 != 0 {
            log::debug!("compiled:\n{}", func);
        }
        self.eng.define_function(func);
        Ok(())
    }

    // -- statements ----------------------------------------------------

    fn compile_stmt(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        debug_assert_eq!(pair.as_rule(), Rule::stmt);
        let inner = pair.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::block => {
                for s in inner.into_inner() {
                    self.compile_stmt(s)?;
                }
                Ok(())
            }
            Rule::if_stmt => self.compile_if(inner),
            Rule::while_stmt => self.compile_while(inner),
            Rule::do_stmt => self.compile_do(inner),
            Rule::for_stmt => self.compile_for(inner),
            Rule::switch_stmt => self.compile_switch(inner),
            Rule::try_stmt => self.compile_try(inner),
            Rule::break_stmt => {
                let idx = self.f.emit(Op::Branch(0));
                let ctx = self
                    .f
                    .loops
                    .last_mut()
                    .ok_or(CalcError::BadLoopControl("break"))?;
                ctx.breaks.push(idx);
                Ok(())
            }
            Rule::continue_stmt => {
                let idx = self.f.emit(Op::Branch(0));
                let ctx = self
                    .f
                    .loops
                    .iter_mut()
                    .rev()
                    .find(|c| !c.is_switch)
                    .ok_or(CalcError::BadLoopControl("continue"))?;
                ctx.continues.push(idx);
                Ok(())
            }
            Rule::goto_stmt => {
                let name = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::ident)
                    .unwrap()
                    .as_str()
                    .to_string();
                let idx = self.f.emit(Op::Branch(0));
                self.f.gotos.push((name, idx));
                Ok(())
            }
            Rule::return_stmt => {
                let expr = inner.into_inner().find(|p| p.as_rule() == Rule::expr);
                match expr {
                    Some(e) => {
                        let e = build_expr(e)?;
                        self.emit_expr(&e)?;
                    }
                    None => {
                        self.f.emit(Op::PushNull);
                    }
                }
                self.f.emit(Op::Return);
                Ok(())
            }
            Rule::local_decl => self.compile_decl(inner, Scope::Local),
            Rule::global_decl => self.compile_decl(inner, Scope::Global),
            Rule::static_decl => self.compile_decl(inner, Scope::Static),
            Rule::mat_decl => self.compile_mat_decl(inner),
            Rule::obj_def => self.compile_obj_def(inner),
            Rule::obj_inst => self.compile_obj_inst(inner),
            Rule::print_stmt => {
                let exprs: Vec<Expr> = inner
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::expr)
                    .map(build_expr)
                    .collect::<Result<_, _>>()?;
                let n = exprs.len();
                for e in &exprs {
                    self.emit_expr(e)?;
                }
                self.f.emit(Op::Print(n));
                Ok(())
            }
            Rule::quit_stmt => {
                if let Some(s) = inner.into_inner().find(|p| p.as_rule() == Rule::str_lit) {
                    let c = self.f.add_const(Value::str_from_bytes(unescape(s.as_str())));
                    self.f.emit(Op::Const(c));
                    self.f.emit(Op::Print(1));
                }
                self.f.emit(Op::Quit);
                Ok(())
            }
            Rule::label_stmt => {
                let mut it = inner.into_inner();
                let name = it.next().unwrap().as_str().to_string();
                let here = self.f.here();
                if self.f.labels.insert(name.clone(), here).is_some() {
                    return Err(CalcError::Redefinition(name));
                }
                self.compile_stmt(it.next().unwrap())
            }
            Rule::expr_stmt => {
                let e = build_expr(inner.into_inner().next().unwrap())?;
                let is_assign = matches!(&e, Expr::Assign(..) | Expr::IncDec { .. });
                self.emit_expr(&e)?;
                if !self.in_function && !is_assign {
                    self.f.emit(Op::PrintTop);
                } else {
                    self.f.emit(Op::Pop);
                }
                Ok(())
            }
            Rule::empty_stmt => Ok(()),
            r => Err(parse_err(format!("unexpected statement {:?}", r))),
        }
    }

    fn compile_if(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        let mut it = pair.into_inner().filter(|p| {
            matches!(p.as_rule(), Rule::expr | Rule::stmt)
        });
        let cond = build_expr(it.next().unwrap())?;
        self.emit_expr(&cond)?;
        let to_else = self.f.emit(Op::BranchIfFalse(0));
        self.compile_stmt(it.next().unwrap())?;
        match it.next() {
            Some(else_stmt) => {
                let to_end = self.f.emit(Op::Branch(0));
                let else_at = self.f.here();
                self.f.patch(to_else, else_at);
                self.compile_stmt(else_stmt)?;
                let end = self.f.here();
                self.f.patch(to_end, end);
            }
            None => {
                let end = self.f.here();
                self.f.patch(to_else, end);
            }
        }
        Ok(())
    }

    fn close_loop(&mut self, break_target: usize, continue_target: usize) {
        let ctx = self.f.loops.pop().unwrap();
        for idx in ctx.breaks {
            self.f.patch(idx, break_target);
        }
        for idx in ctx.continues {
            self.f.patch(idx, continue_target);
        }
    }

    fn compile_while(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        let mut it = pair
            .into_inner()
            .filter(|p| matches!(p.as_rule(), Rule::expr | Rule::stmt));
        let top = self.f.here();
        let cond = build_expr(it.next().unwrap())?;
        self.emit_expr(&cond)?;
        let exit = self.f.emit(Op::BranchIfFalse(0));
        self.f.loops.push(LoopCtx {
            breaks: Vec::new(),
            continues: Vec::new(),
            is_switch: false,
        });
        self.compile_stmt(it.next().unwrap())?;
        self.f.emit(Op::Branch(top));
        let end = self.f.here();
        self.f.patch(exit, end);
        self.close_loop(end, top);
        Ok(())
    }

    fn compile_do(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        let mut it = pair
            .into_inner()
            .filter(|p| matches!(p.as_rule(), Rule::expr | Rule::stmt));
        let top = self.f.here();
        self.f.loops.push(LoopCtx {
            breaks: Vec::new(),
            continues: Vec::new(),
            is_switch: false,
        });
        self.compile_stmt(it.next().unwrap())?;
        let cond_at = self.f.here();
        let cond = build_expr(it.next().unwrap())?;
        self.emit_expr(&cond)?;
        self.f.emit(Op::BranchIfTrue(top));
        let end = self.f.here();
        self.close_loop(end, cond_at);
        Ok(())
    }

    fn compile_for(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        // for "(" expr? ";" expr? ";" expr? ")" stmt -- pest drops the
        // ";" separators, so present expressions are mapped back to
        // their init/cond/step slots by source position
        let src = pair.as_str();
        let mut exprs = Vec::new();
        let mut body = None;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::expr => exprs.push(p),
                Rule::stmt => body = Some(p),
                _ => {}
            }
        }
        let (init, cond, step) = assign_for_slots(src, exprs)?;

        if let Some(p) = init {
            let e = build_expr(p)?;
            self.emit_expr(&e)?;
            self.f.emit(Op::Pop);
        }
        let cond_at = self.f.here();
        let exit = match cond {
            Some(p) => {
                let e = build_expr(p)?;
                self.emit_expr(&e)?;
                Some(self.f.emit(Op::BranchIfFalse(0)))
            }
            None => None,
        };
        self.f.loops.push(LoopCtx {
            breaks: Vec::new(),
            continues: Vec::new(),
            is_switch: false,
        });
        self.compile_stmt(body.ok_or_else(|| parse_err("for body missing"))?)?;
        let step_at = self.f.here();
        if let Some(p) = step {
            let e = build_expr(p)?;
            self.emit_expr(&e)?;
            self.f.emit(Op::Pop);
        }
        self.f.emit(Op::Branch(cond_at));
        let end = self.f.here();
        if let Some(exit) = exit {
            self.f.patch(exit, end);
        }
        self.close_loop(end, step_at);
        Ok(())
    }

    fn compile_switch(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        let mut it = pair.into_inner();
        let scrut = loop {
            let p = it.next().ok_or_else(|| parse_err("switch scrutinee"))?;
            if p.as_rule() == Rule::expr {
                break p;
            }
        };
        let e = build_expr(scrut)?;
        self.emit_expr(&e)?;
        let tmp = self.f.hidden_local();
        self.f.emit(Op::Store(VarRef::Local(tmp), Vec::new()));
        self.f.emit(Op::Pop);

        struct Arm<'a> {
            konst: Option<Value>,
            stmts: Vec<Pair<'a, Rule>>,
            test_idx: Option<usize>,
        }
        let mut arms: Vec<Arm> = Vec::new();
        let mut default_seen = false;
        for arm in it {
            if arm.as_rule() != Rule::switch_arm {
                continue;
            }
            let mut konst = None;
            let mut stmts = Vec::new();
            let mut is_default = true;
            for p in arm.into_inner() {
                match p.as_rule() {
                    Rule::kw_case => is_default = false,
                    Rule::kw_default => is_default = true,
                    Rule::case_const => konst = Some(case_const_value(p)?),
                    Rule::stmt => stmts.push(p),
                    _ => {}
                }
            }
            if is_default {
                if default_seen {
                    return Err(CalcError::Redefinition("default".into()));
                }
                default_seen = true;
            }
            arms.push(Arm {
                konst,
                stmts,
                test_idx: None,
            });
        }

        // linear (const, jump) table
        for arm in arms.iter_mut() {
            if let Some(k) = &arm.konst {
                let c = self.f.add_const(k.clone());
                self.f.emit(Op::LoadLocal(tmp));
                self.f.emit(Op::Const(c));
                self.f.emit(Op::Binary(BinOp::Eq));
                arm.test_idx = Some(self.f.emit(Op::BranchIfTrue(0)));
            }
        }
        // no match: fall to default when present, else past the end
        let miss = self.f.emit(Op::Branch(0));

        self.f.loops.push(LoopCtx {
            breaks: Vec::new(),
            continues: Vec::new(),
            is_switch: true,
        });
        let mut default_at = None;
        let mut arm_bodies = Vec::new();
        for arm in arms {
            let at = self.f.here();
            arm_bodies.push((arm.test_idx, at));
            if arm.konst.is_none() {
                default_at = Some(at);
            }
            for s in arm.stmts {
                self.compile_stmt(s)?;
            }
        }
        let end = self.f.here();
        for (test_idx, at) in arm_bodies {
            if let Some(idx) = test_idx {
                self.f.patch(idx, at);
            }
        }
        self.f.patch(miss, default_at.unwrap_or(end));
        let ctx = self.f.loops.pop().unwrap();
        for idx in ctx.breaks {
            self.f.patch(idx, end);
        }
        debug_assert!(ctx.continues.is_empty());
        Ok(())
    }

    fn compile_try(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        let mut it = pair
            .into_inner()
            .filter(|p| matches!(p.as_rule(), Rule::stmt | Rule::ident));
        let body = it.next().unwrap();
        let catch_var = it.next().unwrap().as_str().to_string();
        let handler_stmt = it.next().unwrap();

        let try_idx = self.f.emit(Op::Try(0));
        self.compile_stmt(body)?;
        self.f.emit(Op::EndTry);
        let to_end = self.f.emit(Op::Branch(0));
        let handler_at = self.f.here();
        self.f.patch(try_idx, handler_at);
        // the VM pushes the error value before entering the handler
        let target = if self.in_function {
            VarRef::Local(self.f.declare_local(&catch_var))
        } else {
            self.var_ref(&catch_var)
        };
        self.f.emit(Op::Store(target, Vec::new()));
        self.f.emit(Op::Pop);
        self.compile_stmt(handler_stmt)?;
        let end = self.f.here();
        self.f.patch(to_end, end);
        Ok(())
    }

    fn compile_decl(&mut self, pair: Pair<Rule>, scope: Scope) -> Result<(), CalcError> {
        for item in pair.into_inner() {
            if item.as_rule() != Rule::decl_item {
                continue;
            }
            let mut it = item.into_inner();
            let name = it.next().unwrap().as_str().to_string();
            let init = it.next();
            match scope {
                Scope::Local => {
                    let slot = self.f.declare_local(&name);
                    if let Some(p) = init {
                        let e = build_expr(p)?;
                        self.emit_expr(&e)?;
                        self.f.emit(Op::Store(VarRef::Local(slot), Vec::new()));
                        self.f.emit(Op::Pop);
                    }
                }
                Scope::Global => {
                    self.f.emit(Op::DeclGlobal(name.clone()));
                    if let Some(p) = init {
                        let e = build_expr(p)?;
                        self.emit_expr(&e)?;
                        self.f.emit(Op::Store(VarRef::Global(name.clone()), Vec::new()));
                        self.f.emit(Op::Pop);
                    }
                }
                Scope::Static => {
                    let key = format!("{}.{}", self.f.name, name);
                    let value = match init {
                        Some(p) => {
                            let e = build_expr(p)?;
                            const_value(&e).ok_or(CalcError::StaticInit(name.clone()))?
                        }
                        None => Value::Null,
                    };
                    let slot = self.eng.alloc_static(&key, value);
                    self.f.statics.insert(name, slot);
                }
            }
        }
        Ok(())
    }

    fn compile_mat_decl(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        let mut name = None;
        let mut specs = Vec::new();
        let mut init = None;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::ident => name = Some(p.as_str().to_string()),
                Rule::mat_bounds => {
                    let exprs: Vec<Expr> = p
                        .into_inner()
                        .map(build_expr)
                        .collect::<Result<_, _>>()?;
                    if exprs.len() == 1 {
                        specs.push((DimSpec::Count, exprs));
                    } else {
                        specs.push((DimSpec::Range, exprs));
                    }
                }
                Rule::mat_init => init = Some(p),
                _ => {}
            }
        }
        let name = name.ok_or_else(|| parse_err("matrix name missing"))?;
        if self.in_function {
            self.f.declare_local(&name);
        }
        let dims: Vec<DimSpec> = specs.iter().map(|(d, _)| *d).collect();
        for (_, exprs) in &specs {
            for e in exprs {
                self.emit_expr(e)?;
            }
        }
        self.f.emit(Op::MakeMatrix(dims));
        if let Some(init) = init {
            let mut elems = Vec::new();
            flatten_mat_init(init, &mut elems)?;
            let n = elems.len();
            for e in &elems {
                self.emit_expr(e)?;
            }
            self.f.emit(Op::InitMatrix(n));
        }
        let target = self.var_ref(&name);
        self.f.emit(Op::Store(target, Vec::new()));
        self.f.emit(Op::Pop);
        Ok(())
    }

    fn compile_obj_def(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        let mut names = pair
            .into_inner()
            .filter(|p| p.as_rule() == Rule::ident)
            .map(|p| p.as_str().to_string());
        let type_name = names.next().ok_or_else(|| parse_err("object type name"))?;
        let fields: Vec<String> = names.collect();
        if fields.is_empty() {
            return Err(parse_err("object type needs at least one field"));
        }
        self.eng.register_objtype(&type_name, fields)?;
        Ok(())
    }

    fn compile_obj_inst(&mut self, pair: Pair<Rule>) -> Result<(), CalcError> {
        let mut names = pair
            .into_inner()
            .filter(|p| p.as_rule() == Rule::ident)
            .map(|p| p.as_str().to_string());
        let type_name = names.next().ok_or_else(|| parse_err("object type name"))?;
        let type_id = self
            .eng
            .objtype_id(&type_name)
            .ok_or(CalcError::UndefinedObjType(type_name))?;
        let vars: Vec<String> = names.collect();
        if vars.is_empty() {
            return Err(parse_err("object variable name missing"));
        }
        for v in vars {
            if self.in_function {
                self.f.declare_local(&v);
            }
            self.f.emit(Op::NewObj(type_id));
            let target = self.var_ref(&v);
            self.f.emit(Op::Store(target, Vec::new()));
            self.f.emit(Op::Pop);
        }
        Ok(())
    }

    // -- expressions ---------------------------------------------------

    /// Name resolution order: locals (parameters included), then the
    /// function's statics, then globals. Assignment to an undeclared
    /// name binds globally.
    fn var_ref(&mut self, name: &str) -> VarRef {
        if let Some(slot) = self.f.local_slot(name) {
            return VarRef::Local(slot);
        }
        if let Some(&slot) = self.f.statics.get(name) {
            return VarRef::Static(slot);
        }
        VarRef::Global(name.to_string())
    }

    /// Split an lvalue expression into its base variable and the
    /// navigation steps; returns the key expressions per step.
    fn lvalue_path<'a>(
        &mut self,
        e: &'a Expr,
    ) -> Result<(VarRef, Vec<PathStep>, Vec<&'a [Expr]>), CalcError> {
        match e {
            Expr::Var(name) => Ok((self.var_ref(name), Vec::new(), Vec::new())),
            Expr::Index(base, keys) => {
                let (r, mut steps, mut keyexprs) = self.lvalue_path(base)?;
                steps.push(PathStep::Index(keys.len()));
                keyexprs.push(keys.as_slice());
                Ok((r, steps, keyexprs))
            }
            Expr::Field(base, name) => {
                let (r, mut steps, mut keyexprs) = self.lvalue_path(base)?;
                steps.push(PathStep::Field(name.clone()));
                keyexprs.push(&[]);
                Ok((r, steps, keyexprs))
            }
            _ => Err(CalcError::BadLvalue),
        }
    }

    fn emit_store_keys(&mut self, keyexprs: &[&[Expr]]) -> Result<(), CalcError> {
        for keys in keyexprs {
            for k in *keys {
                self.emit_expr(k)?;
            }
        }
        Ok(())
    }

    fn emit_load_of(&mut self, base: &VarRef, steps: &[PathStep], keyexprs: &[&[Expr]]) -> Result<(), CalcError> {
        match base {
            VarRef::Local(i) => self.f.emit(Op::LoadLocal(*i)),
            VarRef::Static(i) => self.f.emit(Op::LoadStatic(*i)),
            VarRef::Global(n) => self.f.emit(Op::LoadGlobal(n.clone())),
        };
        for (step, keys) in steps.iter().zip(keyexprs.iter()) {
            match step {
                PathStep::Index(n) => {
                    for k in *keys {
                        self.emit_expr(k)?;
                    }
                    self.f.emit(Op::Index(*n));
                }
                PathStep::Field(name) => {
                    self.f.emit(Op::GetField(name.clone()));
                }
            }
        }
        Ok(())
    }

    fn emit_assign(
        &mut self,
        lhs: &Expr,
        op: Option<BinOp>,
        rhs: &Expr,
    ) -> Result<(), CalcError> {
        let (base, steps, keyexprs) = self.lvalue_path(lhs)?;
        self.emit_store_keys(&keyexprs)?;
        match op {
            None => {
                self.emit_expr(rhs)?;
            }
            Some(op) => {
                self.emit_load_of(&base, &steps, &keyexprs)?;
                self.emit_expr(rhs)?;
                self.f.emit(Op::Binary(op));
            }
        }
        self.f.emit(Op::Store(base, steps));
        Ok(())
    }

    fn emit_expr(&mut self, e: &Expr) -> Result<(), CalcError> {
        match e {
            Expr::Num(q) => {
                let c = self.f.add_const(Value::from_q(q.clone()));
                self.f.emit(Op::Const(c));
            }
            Expr::Imag(q) => {
                let v = Value::from_cplx(crate::cplx::Cplx::new(
                    BigRational::zero(),
                    q.clone(),
                ));
                let c = self.f.add_const(v);
                self.f.emit(Op::Const(c));
            }
            Expr::Str(b) => {
                let c = self.f.add_const(Value::str_from_bytes(b.clone()));
                self.f.emit(Op::Const(c));
            }
            Expr::Null => {
                self.f.emit(Op::PushNull);
            }
            Expr::Var(name) => {
                match self.var_ref(name) {
                    VarRef::Local(i) => self.f.emit(Op::LoadLocal(i)),
                    VarRef::Static(i) => self.f.emit(Op::LoadStatic(i)),
                    VarRef::Global(n) => self.f.emit(Op::LoadGlobal(n)),
                };
            }
            Expr::Unary(op, inner) => {
                self.emit_expr(inner)?;
                self.f.emit(Op::Unary(*op));
            }
            Expr::Binary(op, a, b) => {
                self.emit_expr(a)?;
                self.emit_expr(b)?;
                self.f.emit(Op::Binary(*op));
            }
            Expr::LAnd(a, b) => {
                self.emit_expr(a)?;
                let fail1 = self.f.emit(Op::BranchIfFalse(0));
                self.emit_expr(b)?;
                let fail2 = self.f.emit(Op::BranchIfFalse(0));
                let c1 = self.f.add_const(Value::from_i64(1));
                self.f.emit(Op::Const(c1));
                let to_end = self.f.emit(Op::Branch(0));
                let fail_at = self.f.here();
                self.f.patch(fail1, fail_at);
                self.f.patch(fail2, fail_at);
                let c0 = self.f.add_const(Value::from_i64(0));
                self.f.emit(Op::Const(c0));
                let end = self.f.here();
                self.f.patch(to_end, end);
            }
            Expr::LOr(a, b) => {
                self.emit_expr(a)?;
                let ok1 = self.f.emit(Op::BranchIfTrue(0));
                self.emit_expr(b)?;
                let ok2 = self.f.emit(Op::BranchIfTrue(0));
                let c0 = self.f.add_const(Value::from_i64(0));
                self.f.emit(Op::Const(c0));
                let to_end = self.f.emit(Op::Branch(0));
                let ok_at = self.f.here();
                self.f.patch(ok1, ok_at);
                self.f.patch(ok2, ok_at);
                let c1 = self.f.add_const(Value::from_i64(1));
                self.f.emit(Op::Const(c1));
                let end = self.f.here();
                self.f.patch(to_end, end);
            }
            Expr::Ternary(c, t, f) => {
                self.emit_expr(c)?;
                let to_else = self.f.emit(Op::BranchIfFalse(0));
                self.emit_expr(t)?;
                let to_end = self.f.emit(Op::Branch(0));
                let else_at = self.f.here();
                self.f.patch(to_else, else_at);
                self.emit_expr(f)?;
                let end = self.f.here();
                self.f.patch(to_end, end);
            }
            Expr::Assign(lhs, op, rhs) => {
                self.emit_assign(lhs, *op, rhs)?;
            }
            Expr::IncDec {
                inc,
                prefix,
                target,
            } => {
                let op = if *inc { BinOp::Add } else { BinOp::Sub };
                let one = Expr::Num(BigRational::one());
                if *prefix {
                    self.emit_assign(target, Some(op), &one)?;
                } else {
                    // old value stays beneath the store sequence
                    let (base, steps, keyexprs) = self.lvalue_path(target)?;
                    self.emit_load_of(&base, &steps, &keyexprs)?;
                    self.emit_store_keys(&keyexprs)?;
                    self.emit_load_of(&base, &steps, &keyexprs)?;
                    let c = self.f.add_const(Value::from_i64(1));
                    self.f.emit(Op::Const(c));
                    self.f.emit(Op::Binary(op));
                    self.f.emit(Op::Store(base, steps));
                    self.f.emit(Op::Pop);
                }
            }
            Expr::Call(name, args) => {
                self.emit_call(name, args)?;
            }
            Expr::Index(base, keys) => {
                self.emit_expr(base)?;
                for k in keys {
                    self.emit_expr(k)?;
                }
                self.f.emit(Op::Index(keys.len()));
            }
            Expr::Field(base, name) => {
                self.emit_expr(base)?;
                self.f.emit(Op::GetField(name.clone()));
            }
        }
        Ok(())
    }

    fn emit_call(&mut self, name: &str, args: &[Expr]) -> Result<(), CalcError> {
        // a handful of names compile to dedicated opcodes
        match (name, args.len()) {
            ("list", _) => {
                for a in args {
                    self.emit_expr(a)?;
                }
                self.f.emit(Op::MakeList(args.len()));
                return Ok(());
            }
            ("iserr", 1) => {
                self.emit_expr(&args[0])?;
                self.f.emit(Op::IsErr);
                return Ok(());
            }
            ("errno", 1) => {
                self.emit_expr(&args[0])?;
                self.f.emit(Op::Errno);
                return Ok(());
            }
            ("error", 1) | ("error", 2) => {
                // message first, then the code on top
                if args.len() == 2 {
                    self.emit_expr(&args[1])?;
                }
                self.emit_expr(&args[0])?;
                self.f.emit(Op::NewError(args.len() == 2));
                return Ok(());
            }
            ("raise", 1) => {
                self.emit_expr(&args[0])?;
                self.f.emit(Op::RaiseError);
                return Ok(());
            }
            _ => {}
        }
        for a in args {
            self.emit_expr(a)?;
        }
        if let Some((id, def)) = builtin::lookup(name) {
            if args.len() < def.min_args {
                return Err(CalcError::TooFewArgs(name.to_string(), def.min_args));
            }
            if args.len() > def.max_args {
                return Err(CalcError::TooManyArgs(name.to_string(), def.max_args));
            }
            self.f.emit(Op::CallBuiltin(id, args.len()));
        } else {
            self.f.emit(Op::Call(name.to_string(), args.len()));
        }
        Ok(())
    }
}

enum Scope {
    Local,
    Global,
    Static,
}

fn const_value(e: &Expr) -> Option<Value> {
    match e {
        Expr::Num(q) => Some(Value::from_q(q.clone())),
        Expr::Str(b) => Some(Value::str_from_bytes(b.clone())),
        Expr::Null => Some(Value::Null),
        Expr::Unary(UnOp::Neg, inner) => match inner.as_ref() {
            Expr::Num(q) => Some(Value::from_q(-q.clone())),
            _ => None,
        },
        _ => None,
    }
}

fn case_const_value(pair: Pair<Rule>) -> Result<Value, CalcError> {
    let p = pair.into_inner().next().unwrap();
    Ok(match p.as_rule() {
        Rule::neg_num => {
            let inner = p.into_inner().next().unwrap();
            Value::from_q(-parse_decimal(inner.as_str())?)
        }
        Rule::int_lit | Rule::real_lit => Value::from_q(parse_decimal(p.as_str())?),
        Rule::hex_lit => Value::from_q(parse_int_radix(p.as_str(), 16)?),
        Rule::oct_lit => Value::from_q(parse_int_radix(p.as_str(), 8)?),
        Rule::bin_lit => Value::from_q(parse_int_radix(p.as_str(), 2)?),
        Rule::imag_lit => {
            let s = p.as_str();
            Value::from_cplx(crate::cplx::Cplx::new(
                BigRational::zero(),
                parse_decimal(&s[..s.len() - 1])?,
            ))
        }
        Rule::str_lit => Value::str_from_bytes(unescape(p.as_str())),
        r => return Err(parse_err(format!("bad case constant {:?}", r))),
    })
}

fn flatten_mat_init<'a>(pair: Pair<'a, Rule>, out: &mut Vec<Expr>) -> Result<(), CalcError> {
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::mat_item => flatten_mat_init(p, out)?,
            Rule::mat_init => flatten_mat_init(p, out)?,
            Rule::expr => out.push(build_expr(p)?),
            _ => {}
        }
    }
    Ok(())
}

// The `for` grammar loses the ";" separators; recover which of the
// three header slots each present expression occupies by locating the
// separators in the statement text and comparing source offsets.
fn assign_for_slots<'a>(
    src: &str,
    present: Vec<Pair<'a, Rule>>,
) -> Result<
    (
        Option<Pair<'a, Rule>>,
        Option<Pair<'a, Rule>>,
        Option<Pair<'a, Rule>>,
    ),
    CalcError,
> {
    if present.len() == 3 {
        let mut it = present.into_iter();
        return Ok((it.next(), it.next(), it.next()));
    }
    let open = src.find('(').ok_or_else(|| parse_err("bad for header"))?;
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    let mut semis = Vec::new();
    let mut close = src.len();
    for (i, ch) in src.char_indices() {
        if i < open {
            continue;
        }
        if in_str {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth -= 1;
                if depth == 0 {
                    close = i;
                    break;
                }
            }
            ';' if depth == 1 => semis.push(i),
            _ => {}
        }
    }
    if semis.len() != 2 {
        return Err(parse_err("bad for header"));
    }
    let origin = src.as_ptr() as usize;
    let mut slots: [Option<Pair<Rule>>; 3] = [None, None, None];
    for p in present {
        // the span str points into the same buffer as `src`
        let abs = p.as_span().as_str().as_ptr() as usize - origin;
        let slot = if abs < semis[0] {
            0
        } else if abs < semis[1] {
            1
        } else if abs < close {
            2
        } else {
            return Err(parse_err("bad for header"));
        };
        slots[slot] = Some(p);
    }
    let [s0, s1, s2] = slots;
    Ok((s0, s1, s2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn compile(src: &str) -> Result<Function, CalcError> {
        let mut eng = Engine::new();
        compile_program(&mut eng, src)
    }

    #[test]
    fn literals_parse() {
        assert_eq!(parse_decimal("123").unwrap(), BigRational::from_integer(123.into()));
        assert_eq!(
            parse_decimal("1.25").unwrap(),
            BigRational::new(5.into(), 4.into())
        );
        assert_eq!(
            parse_decimal(".5").unwrap(),
            BigRational::new(1.into(), 2.into())
        );
        assert_eq!(
            parse_decimal("12e2").unwrap(),
            BigRational::from_integer(1200.into())
        );
        assert_eq!(
            parse_decimal("1.5e-3").unwrap(),
            BigRational::new(3.into(), 2000.into())
        );
    }

    #[test]
    fn unescape_handles_common_escapes() {
        assert_eq!(unescape("\"a\\nb\""), b"a\nb".to_vec());
        assert_eq!(unescape("\"\\x41\\0\""), vec![0x41, 0]);
        assert_eq!(unescape("\"\\\"\""), b"\"".to_vec());
    }

    #[test]
    fn simple_expression_compiles() {
        let f = compile("1 + 2 * 3;").unwrap();
        // consts pushed, mul before add
        let muls = f
            .code
            .iter()
            .filter(|o| matches!(o, Op::Binary(BinOp::Mul)))
            .count();
        let adds = f
            .code
            .iter()
            .filter(|o| matches!(o, Op::Binary(BinOp::Add)))
            .count();
        assert_eq!(muls, 1);
        assert_eq!(adds, 1);
        assert!(f.code.contains(&Op::PrintTop));
    }

    #[test]
    fn power_is_right_associative() {
        // 2 ** 3 ** 2 == 2 ** (3 ** 2): the second ** must be emitted first
        let f = compile("2 ** 3 ** 2;").unwrap();
        let pows: Vec<usize> = f
            .code
            .iter()
            .enumerate()
            .filter(|(_, o)| matches!(o, Op::Binary(BinOp::Pow)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(pows.len(), 2);
        assert_eq!(pows[1], pows[0] + 1);
    }

    #[test]
    fn integer_division_is_not_a_comment() {
        let f = compile("7 // 2;").unwrap();
        assert!(f.code.iter().any(|o| matches!(o, Op::Binary(BinOp::Quo))));
    }

    #[test]
    fn comments_are_skipped() {
        assert!(compile("1 /* a comment */ + 2; # line\n").is_ok());
    }

    #[test]
    fn define_registers_function() {
        let mut eng = Engine::new();
        compile_program(&mut eng, "define f(x) { return x + 1; }").unwrap();
        assert!(eng.function(&"f".to_string()).is_some());
    }

    #[test]
    fn define_shadowing_builtin_rejected() {
        assert!(matches!(
            compile("define sqrt(x) { return x; }"),
            Err(CalcError::Redefinition(_))
        ));
    }

    #[test]
    fn goto_to_unknown_label_fails() {
        assert!(matches!(
            compile("goto nowhere;"),
            Err(CalcError::UndefinedLabel(_))
        ));
        assert!(compile("goto done; 1; done: 2;").is_ok());
    }

    #[test]
    fn break_outside_loop_rejected() {
        assert!(matches!(
            compile("break;"),
            Err(CalcError::BadLoopControl(_))
        ));
    }

    #[test]
    fn loops_compile_with_backward_branch() {
        let f = compile("local i = 0; while (i < 3) i = i + 1;").unwrap();
        let has_backward = f.code.iter().enumerate().any(|(pc, o)| match o {
            Op::Branch(t) => *t <= pc,
            _ => false,
        });
        assert!(has_backward);
    }

    #[test]
    fn switch_builds_linear_table() {
        let f = compile(
            "switch (2) { case 1: 10; break; case 2: 20; break; default: 30; }",
        )
        .unwrap();
        let eqs = f
            .code
            .iter()
            .filter(|o| matches!(o, Op::Binary(BinOp::Eq)))
            .count();
        assert_eq!(eqs, 2);
    }

    #[test]
    fn try_emits_region_markers() {
        let f = compile("try 1/0; catch (e) print e;").unwrap();
        assert!(f.code.iter().any(|o| matches!(o, Op::Try(_))));
        assert!(f.code.iter().any(|o| matches!(o, Op::EndTry)));
    }

    #[test]
    fn assignment_is_not_echoed() {
        let f = compile("x = 3;").unwrap();
        assert!(!f.code.contains(&Op::PrintTop));
        let f = compile("x = 3; x;").unwrap();
        assert!(f.code.contains(&Op::PrintTop));
    }

    #[test]
    fn error_builtins_become_opcodes() {
        let f = compile("iserr(x); errno(x); error(10001);").unwrap();
        assert!(f.code.contains(&Op::IsErr));
        assert!(f.code.contains(&Op::Errno));
        assert!(f.code.contains(&Op::NewError(false)));
    }

    #[test]
    fn mat_decl_emits_make_matrix() {
        let f = compile("mat m[3, 1:2];").unwrap();
        assert!(f
            .code
            .iter()
            .any(|o| matches!(o, Op::MakeMatrix(d) if d.len() == 2)));
    }

    #[test]
    fn bad_lvalue_rejected() {
        assert!(matches!(compile("1 = 2;"), Err(CalcError::BadLvalue)));
        assert!(matches!(compile("f() = 2;"), Err(CalcError::BadLvalue)));
    }

    #[test]
    fn imag_literal_builds_complex_constant() {
        let f = compile("2i;").unwrap();
        assert!(f
            .consts
            .iter()
            .any(|c| matches!(c, Value::Cplx(_))));
    }

    #[test]
    fn for_loop_slots() {
        assert!(compile("for (i = 0; i < 3; i++) print i;").is_ok());
        assert!(compile("for (;;) break;").is_ok());
        assert!(compile("for (; 1;) break;").is_ok());
    }
}
