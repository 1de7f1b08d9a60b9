//! The stack virtual machine.
//!
//! One value stack, one frame stack, dispatch as a tight match on the
//! opcode. Errors travel two ways, as the configuration directs:
//! arithmetic failures normally become first-class `Error` values
//! pushed in place of a result, but while `stoponerror` is positive
//! the same failure raises a fault that unwinds to the innermost
//! active TRY region (or all the way out). A user interrupt is a
//! fault no TRY may catch; it is polled at backward branches and
//! calls.

use std::rc::Rc;

use log::trace;

use crate::builtin;
use crate::code::{BinOp, DimSpec, FuncRef, Op, PathStep, VarRef};
use crate::display;
use crate::engine::Engine;
use crate::errors::{CalcError, USER_ERROR_BASE};
use crate::matrix::Matrix;
use crate::object::{self, Object, PRINT_SUFFIX};
use crate::value::{self, ErrValue, Value};

/// Why execution stopped before the program ran out.
#[derive(Debug)]
pub enum Fault {
    /// a raised error, catchable by TRY regions
    Error(ErrValue),
    /// user interrupt; unwinds everything
    Interrupt,
    /// the quit statement
    Quit,
}

struct TryCtx {
    handler: usize,
    stack_len: usize,
}

struct Frame {
    func: FuncRef,
    pc: usize,
    bp: usize,
    tries: Vec<TryCtx>,
}

pub struct Vm<'e> {
    pub eng: &'e mut Engine,
    stack: Vec<Value>,
    frames: Vec<Frame>,
}

type StepResult = Result<(), Fault>;

impl<'e> Vm<'e> {
    pub fn new(eng: &'e mut Engine) -> Self {
        Vm {
            eng,
            stack: Vec::with_capacity(64),
            frames: Vec::new(),
        }
    }

    pub fn run(&mut self, func: FuncRef, args: Vec<Value>) -> Result<Value, Fault> {
        self.push_frame(func, args)?;
        self.run_until(0)
    }

    fn push_frame(&mut self, func: FuncRef, mut args: Vec<Value>) -> StepResult {
        if self.eng.check_interrupt() {
            return Err(Fault::Interrupt);
        }
        if args.len() > func.param_count() {
            return Err(self.hard(CalcError::TooManyArgs(
                func.name.clone(),
                func.param_count(),
            )));
        }
        let bp = self.stack.len();
        args.resize(func.param_count(), Value::Null);
        self.stack.extend(args);
        for _ in func.param_count()..func.local_count {
            self.stack.push(Value::Null);
        }
        self.frames.push(Frame {
            func,
            pc: 0,
            bp,
            tries: Vec::new(),
        });
        Ok(())
    }

    /// Execute until the frame stack shrinks back to `base`; the value
    /// returned by the frame above `base` is the result.
    fn run_until(&mut self, base: usize) -> Result<Value, Fault> {
        loop {
            match self.step() {
                Ok(()) => {}
                Err(Fault::Error(ev)) => self.unwind(base, ev)?,
                Err(other) => {
                    // interrupts and quit release everything
                    while self.frames.len() > base {
                        let bp = self.frames.last().unwrap().bp;
                        self.stack.truncate(bp);
                        self.frames.pop();
                    }
                    return Err(other);
                }
            }
            if self.frames.len() <= base {
                return Ok(self.stack.pop().unwrap_or(Value::Null));
            }
        }
    }

    /// Unwind a fault to the innermost TRY no deeper than `base`.
    fn unwind(&mut self, base: usize, ev: ErrValue) -> StepResult {
        while self.frames.len() > base {
            let frame = self.frames.last_mut().unwrap();
            if let Some(t) = frame.tries.pop() {
                self.stack.truncate(t.stack_len);
                self.stack.push(Value::Err(ev));
                frame.pc = t.handler;
                return Ok(());
            }
            let bp = frame.bp;
            self.stack.truncate(bp);
            self.frames.pop();
        }
        Err(Fault::Error(ev))
    }

    fn hard(&self, e: CalcError) -> Fault {
        Fault::Error(ErrValue::from_error(&e))
    }

    /// Route an arithmetic result through the error-value channel:
    /// a failure becomes an `Error` value unless `stoponerror` is
    /// positive, in which case it faults and the counter drops.
    fn arith_outcome(&mut self, r: Result<Value, CalcError>) -> Result<Value, Fault> {
        match r {
            Ok(v) => Ok(v),
            Err(e) => {
                let ev = ErrValue::from_error(&e);
                if self.eng.config.stoponerror > 0 {
                    self.eng.config.stoponerror -= 1;
                    Err(Fault::Error(ev))
                } else {
                    Ok(Value::Err(ev))
                }
            }
        }
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len().saturating_sub(n);
        self.stack.split_off(at)
    }

    fn load_var(&mut self, base: &VarRef) -> Result<Value, Fault> {
        match base {
            VarRef::Local(i) => {
                let bp = self.frames.last().unwrap().bp;
                Ok(self.stack[bp + i].clone())
            }
            VarRef::Static(i) => Ok(self.eng.static_value(*i)),
            VarRef::Global(name) => self
                .eng
                .global(name)
                .ok_or_else(|| self.hard(CalcError::UndefinedVar(name.clone()))),
        }
    }

    fn store_var(&mut self, base: &VarRef, v: Value) {
        match base {
            VarRef::Local(i) => {
                let bp = self.frames.last().unwrap().bp;
                self.stack[bp + i] = v;
            }
            VarRef::Static(i) => self.eng.set_static(*i, v),
            VarRef::Global(name) => self.eng.set_global(name, v),
        }
    }

    /// Write through a navigation path, copy-on-write at every level.
    fn store_path(
        &mut self,
        cont: &mut Value,
        steps: &[PathStep],
        keys: &[Vec<Value>],
        value: Value,
    ) -> Result<(), CalcError> {
        match steps.split_first() {
            None => {
                *cont = value;
                Ok(())
            }
            Some((step, rest)) => match step {
                PathStep::Index(_) => {
                    if rest.is_empty() {
                        value::index_set(cont, &keys[0], value)
                    } else {
                        let mut sub = value::index_get(cont, &keys[0])?;
                        self.store_path(&mut sub, rest, &keys[1..], value)?;
                        value::index_set(cont, &keys[0], sub)
                    }
                }
                PathStep::Field(name) => {
                    let obj = match cont {
                        Value::Obj(o) => o,
                        Value::Err(_) => {
                            return Err(CalcError::TypeMismatchOne(".", "error"));
                        }
                        other => {
                            return Err(CalcError::TypeMismatchOne(".", other.type_name()))
                        }
                    };
                    let ty = self
                        .eng
                        .objtype(obj.type_id)
                        .ok_or_else(|| CalcError::UndefinedObjType(format!("#{}", obj.type_id)))?
                        .clone();
                    let o = Rc::make_mut(obj);
                    if rest.is_empty() {
                        o.set_field(&ty, name, value)
                    } else {
                        let mut sub = o.get_field(&ty, name)?.clone();
                        self.store_path(&mut sub, rest, &keys[1..], value)?;
                        o.set_field(&ty, name, sub)
                    }
                }
            },
        }
    }

    fn call_function(&mut self, f: FuncRef, args: Vec<Value>) -> Result<Value, Fault> {
        let depth = self.frames.len();
        self.push_frame(f, args)?;
        self.run_until(depth)
    }

    /// Binary dispatch with object operands: the left type's override
    /// wins, then the right's, operands always in source order.
    fn binary(&mut self, op: BinOp, a: Value, b: Value) -> Result<Value, Fault> {
        if let Value::Err(_) = a {
            return Ok(a);
        }
        if let Value::Err(_) = b {
            return Ok(b);
        }
        let a_obj = matches!(a, Value::Obj(_));
        let b_obj = matches!(b, Value::Obj(_));
        if a_obj || b_obj {
            let suffix = match object::binop_suffix(op) {
                Some(s) => s,
                None => {
                    return self.arith_outcome(Err(CalcError::NoOperator(
                        "?".to_string(),
                        op.symbol(),
                    )))
                }
            };
            for operand in [&a, &b] {
                if let Value::Obj(o) = operand {
                    let fname = match self.eng.objtype(o.type_id) {
                        Some(t) => t.override_name(suffix),
                        None => continue,
                    };
                    if let Some(f) = self.eng.function(&fname) {
                        let mut r = self.call_function(f, vec![a.clone(), b.clone()])?;
                        if op == BinOp::Ne {
                            r = Value::bool_val(!r.is_true());
                        }
                        return Ok(r);
                    }
                }
            }
            let tyname = match (&a, &b) {
                (Value::Obj(o), _) | (_, Value::Obj(o)) => self
                    .eng
                    .objtype(o.type_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_default(),
                _ => String::new(),
            };
            return self.arith_outcome(Err(CalcError::NoOperator(tyname, op.symbol())));
        }
        let r = value::binop(op, a, b, &self.eng.config);
        self.arith_outcome(r)
    }

    fn unary(&mut self, op: crate::code::UnOp, v: Value) -> Result<Value, Fault> {
        if let Value::Err(_) = v {
            return Ok(v);
        }
        let over = match (&v, object::unop_suffix(op)) {
            (Value::Obj(o), Some(suffix)) => self
                .eng
                .objtype(o.type_id)
                .map(|ty| (ty.name.clone(), ty.override_name(suffix))),
            _ => None,
        };
        if let Some((tyname, fname)) = over {
            if let Some(f) = self.eng.function(&fname) {
                return self.call_function(f, vec![v]);
            }
            return self.arith_outcome(Err(CalcError::NoOperator(tyname, op.symbol())));
        }
        let r = value::unop(op, v, &self.eng.config);
        self.arith_outcome(r)
    }

    fn print_values(&mut self, vals: Vec<Value>) -> StepResult {
        let total = vals.len();
        let mut parts = Vec::new();
        for v in vals {
            if let Value::Obj(o) = &v {
                let over = self
                    .eng
                    .objtype(o.type_id)
                    .map(|t| t.override_name(PRINT_SUFFIX))
                    .and_then(|n| self.eng.function(&n));
                if let Some(f) = over {
                    let _ = self.call_function(f, vec![v])?;
                    continue;
                }
            }
            parts.push(display::format_value(&v, &self.eng.config, self.eng.objtypes()));
        }
        if !parts.is_empty() || total == 0 {
            self.eng.emit_line(parts.join(" "));
        }
        Ok(())
    }

    fn step(&mut self) -> StepResult {
        let frame = self.frames.last().unwrap();
        let pc = frame.pc;
        let op = frame.func.code[pc].clone();
        self.frames.last_mut().unwrap().pc = pc + 1;
        if self.eng.config.calc_debug & 2 != 0 {
            trace!("pc {:4} {:?}", pc, op);
        }
        match op {
            Op::Const(i) => {
                let v = self.frames.last().unwrap().func.consts[i].clone();
                self.stack.push(v);
            }
            Op::PushNull => self.stack.push(Value::Null),
            Op::Dup => {
                let v = self.stack.last().cloned().unwrap_or(Value::Null);
                self.stack.push(v);
            }
            Op::Pop => {
                self.pop();
            }

            Op::LoadLocal(i) => {
                let bp = self.frames.last().unwrap().bp;
                let v = self.stack[bp + i].clone();
                self.stack.push(v);
            }
            Op::StoreLocal(i) => {
                let v = self.pop();
                let bp = self.frames.last().unwrap().bp;
                self.stack[bp + i] = v;
            }
            Op::LoadStatic(i) => {
                let v = self.eng.static_value(i);
                self.stack.push(v);
            }
            Op::StoreStatic(i) => {
                let v = self.pop();
                self.eng.set_static(i, v);
            }
            Op::LoadGlobal(ref name) => {
                let v = self
                    .eng
                    .global(name)
                    .ok_or_else(|| self.hard(CalcError::UndefinedVar(name.clone())))?;
                self.stack.push(v);
            }
            Op::StoreGlobal(ref name) => {
                let v = self.pop();
                self.eng.set_global(name, v);
            }
            Op::DeclGlobal(ref name) => {
                if self.eng.global(name).is_none() {
                    self.eng.set_global(name, Value::Null);
                }
            }

            Op::Store(ref base, ref steps) => {
                let value = self.pop();
                // collect the per-step keys pushed in path order
                let mut keys: Vec<Vec<Value>> = Vec::with_capacity(steps.len());
                for step in steps.iter().rev() {
                    match step {
                        PathStep::Index(n) => keys.push(self.pop_n(*n)),
                        PathStep::Field(_) => keys.push(Vec::new()),
                    }
                }
                keys.reverse();
                if steps.is_empty() {
                    self.store_var(base, value.clone());
                } else {
                    let mut root = self.load_var(base)?;
                    if let Err(e) = self.store_path(&mut root, steps, &keys, value.clone()) {
                        return Err(self.hard(e));
                    }
                    self.store_var(base, root);
                }
                self.stack.push(value);
            }

            Op::Call(ref name, argc) => {
                let f = self
                    .eng
                    .function(name)
                    .ok_or_else(|| self.hard(CalcError::UndefinedFunc(name.clone())))?;
                let args = self.pop_n(argc);
                self.push_frame(f, args)?;
            }
            Op::CallBuiltin(id, argc) => {
                if self.eng.check_interrupt() {
                    return Err(Fault::Interrupt);
                }
                let args = self.pop_n(argc);
                // error operands flow through untouched
                if let Some(e) = args.iter().find(|a| matches!(a, Value::Err(_))) {
                    let e = e.clone();
                    self.stack.push(e);
                    return Ok(());
                }
                let r = builtin::call(id, self.eng, args);
                let v = self.arith_outcome(r)?;
                self.stack.push(v);
            }

            Op::Index(n) => {
                let keys = self.pop_n(n);
                let cont = self.pop();
                if let Value::Err(_) = cont {
                    self.stack.push(cont);
                    return Ok(());
                }
                if let Some(e) = keys.iter().find(|k| matches!(k, Value::Err(_))) {
                    let e = e.clone();
                    self.stack.push(e);
                    return Ok(());
                }
                let v = value::index_get(&cont, &keys).map_err(|e| self.hard(e))?;
                self.stack.push(v);
            }
            Op::GetField(ref name) => {
                let v = self.pop();
                match v {
                    Value::Err(_) => self.stack.push(v),
                    Value::Obj(o) => {
                        let ty = self
                            .eng
                            .objtype(o.type_id)
                            .ok_or_else(|| {
                                self.hard(CalcError::UndefinedObjType(format!("#{}", o.type_id)))
                            })?
                            .clone();
                        let fv = o.get_field(&ty, name).map_err(|e| self.hard(e))?.clone();
                        self.stack.push(fv);
                    }
                    other => {
                        return Err(
                            self.hard(CalcError::TypeMismatchOne(".", other.type_name()))
                        )
                    }
                }
            }

            Op::Unary(uop) => {
                let v = self.pop();
                let r = self.unary(uop, v)?;
                self.stack.push(r);
            }
            Op::Binary(bop) => {
                let b = self.pop();
                let a = self.pop();
                let r = self.binary(bop, a, b)?;
                self.stack.push(r);
            }

            Op::Branch(t) => {
                if t <= pc && self.eng.check_interrupt() {
                    return Err(Fault::Interrupt);
                }
                self.frames.last_mut().unwrap().pc = t;
            }
            Op::BranchIfFalse(t) => {
                let v = self.pop();
                if let Value::Err(ev) = v {
                    return Err(Fault::Error(ev));
                }
                if !v.is_true() {
                    if t <= pc && self.eng.check_interrupt() {
                        return Err(Fault::Interrupt);
                    }
                    self.frames.last_mut().unwrap().pc = t;
                }
            }
            Op::BranchIfTrue(t) => {
                let v = self.pop();
                if let Value::Err(ev) = v {
                    return Err(Fault::Error(ev));
                }
                if v.is_true() {
                    if t <= pc && self.eng.check_interrupt() {
                        return Err(Fault::Interrupt);
                    }
                    self.frames.last_mut().unwrap().pc = t;
                }
            }
            Op::Return => {
                let rv = self.pop();
                let frame = self.frames.pop().unwrap();
                self.stack.truncate(frame.bp);
                self.stack.push(rv);
            }

            Op::MakeList(n) => {
                let elems = self.pop_n(n);
                self.stack
                    .push(Value::List(Rc::new(crate::list::List::from_vec(elems))));
            }
            Op::MakeMatrix(ref dims) => {
                let mut bounds = vec![(0i64, 0i64); dims.len()];
                for (i, d) in dims.iter().enumerate().rev() {
                    match d {
                        DimSpec::Range => {
                            let hi = self.pop();
                            let lo = self.pop();
                            let hi = int_bound(&hi).map_err(|e| self.hard(e))?;
                            let lo = int_bound(&lo).map_err(|e| self.hard(e))?;
                            bounds[i] = (lo, hi);
                        }
                        DimSpec::Count => {
                            let n = self.pop();
                            let n = int_bound(&n).map_err(|e| self.hard(e))?;
                            bounds[i] = (0, n - 1);
                        }
                    }
                }
                let m = Matrix::new(bounds).map_err(|e| self.hard(e))?;
                self.stack.push(Value::Mat(Rc::new(m)));
            }
            Op::InitMatrix(n) => {
                let elems = self.pop_n(n);
                let mv = self.pop();
                match mv {
                    Value::Mat(mut m) => {
                        if n > m.size() {
                            return Err(self.hard(CalcError::MatrixDef(format!(
                                "{} initializers for {} cells",
                                n,
                                m.size()
                            ))));
                        }
                        let mm = Rc::make_mut(&mut m);
                        for (i, e) in elems.into_iter().enumerate() {
                            mm.set_linear(i, e).map_err(|e| self.hard(e))?;
                        }
                        self.stack.push(Value::Mat(m));
                    }
                    _ => return Err(self.hard(CalcError::MatrixDef("not a matrix".into()))),
                }
            }
            Op::NewObj(type_id) => {
                let nfields = self
                    .eng
                    .objtype(type_id)
                    .map(|t| t.fields.len())
                    .ok_or_else(|| {
                        self.hard(CalcError::UndefinedObjType(format!("#{}", type_id)))
                    })?;
                self.stack
                    .push(Value::Obj(Rc::new(Object::new(type_id, nfields))));
            }

            Op::Try(handler) => {
                let depth = self.stack.len();
                self.frames.last_mut().unwrap().tries.push(TryCtx {
                    handler,
                    stack_len: depth,
                });
            }
            Op::EndTry => {
                self.frames.last_mut().unwrap().tries.pop();
            }

            Op::IsErr => {
                let v = self.pop();
                self.stack
                    .push(Value::bool_val(matches!(v, Value::Err(_))));
            }
            Op::Errno => {
                let v = self.pop();
                let code = match v {
                    Value::Err(e) => e.code as i64,
                    _ => 0,
                };
                self.stack.push(Value::from_i64(code));
            }
            Op::NewError(has_msg) => {
                let code_v = self.pop();
                let msg = if has_msg {
                    let m = self.pop();
                    Some(Rc::new(
                        m.expect_str("error").map_err(|e| self.hard(e))?,
                    ))
                } else {
                    None
                };
                let code = code_v.expect_int("error").map_err(|e| self.hard(e))?;
                let code = num_traits::ToPrimitive::to_u32(&code)
                    .filter(|&c| c >= USER_ERROR_BASE)
                    .ok_or_else(|| {
                        self.hard(CalcError::InvalidArg("error", code_v.to_string()))
                    })?;
                self.stack.push(Value::Err(ErrValue { code, msg }));
            }
            Op::RaiseError => {
                let v = self.pop();
                match v {
                    Value::Err(ev) => return Err(Fault::Error(ev)),
                    other => {
                        let code = other.expect_int("raise").map_err(|e| self.hard(e))?;
                        let code = num_traits::ToPrimitive::to_u32(&code)
                            .filter(|&c| c >= USER_ERROR_BASE)
                            .ok_or_else(|| {
                                self.hard(CalcError::InvalidArg("raise", other.to_string()))
                            })?;
                        return Err(Fault::Error(ErrValue { code, msg: None }));
                    }
                }
            }

            Op::Print(n) => {
                let vals = self.pop_n(n);
                self.print_values(vals)?;
            }
            Op::PrintTop => {
                let v = self.pop();
                if !matches!(v, Value::Null) {
                    self.eng.note_result(v);
                }
            }

            Op::Quit => return Err(Fault::Quit),
        }
        Ok(())
    }
}

fn int_bound(v: &Value) -> Result<i64, CalcError> {
    let i = v.expect_int("mat")?;
    num_traits::ToPrimitive::to_i64(&i).ok_or(CalcError::Overflow("mat"))
}
