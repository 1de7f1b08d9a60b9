//! The engine: every piece of process-wide state the original kept in
//! globals, gathered into one context passed to each public entry
//! point. The REPL owns exactly one of these.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::code::{FuncRef, Function};
use crate::compile::compile_program;
use crate::config::Config;
use crate::display;
use crate::errors::CalcError;
use crate::fileio::FileTable;
use crate::object::ObjType;
use crate::randstate::Randstate;
use crate::transc::NumCache;
use crate::value::{ErrValue, Value};
use crate::vm::{Fault, Vm};

pub struct Engine {
    pub config: Config,
    globals: HashMap<String, Value>,
    funcs: HashMap<String, FuncRef>,
    objtypes: Vec<ObjType>,
    objtype_ids: HashMap<String, usize>,
    statics: Vec<Value>,
    static_slots: HashMap<String, usize>,
    pub cache: NumCache,
    pub rand: Randstate,
    pub files: FileTable,
    interrupt: Arc<AtomicBool>,
    /// echo top-level expression results (the REPL turns this on)
    pub echo: bool,
    captured: Option<Vec<String>>,
    last: Option<Value>,
    quit: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            config: Config::default(),
            globals: HashMap::new(),
            funcs: HashMap::new(),
            objtypes: Vec::new(),
            objtype_ids: HashMap::new(),
            statics: Vec::new(),
            static_slots: HashMap::new(),
            cache: NumCache::new(),
            rand: Randstate::default(),
            files: FileTable::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
            echo: false,
            captured: None,
            last: None,
            quit: false,
        }
    }

    /// Compile and run one source fragment. Definitions stick to the
    /// engine; the value of the last top-level expression statement is
    /// returned.
    pub fn eval_str(&mut self, src: &str) -> Result<Option<Value>, ErrValue> {
        self.last = None;
        let main = compile_program(self, src).map_err(|e| ErrValue::from_error(&e))?;
        let result = {
            let mut vm = Vm::new(self);
            vm.run(Rc::new(main), Vec::new())
        };
        match result {
            Ok(_) => Ok(self.last.take()),
            Err(Fault::Error(ev)) => Err(ev),
            Err(Fault::Interrupt) => Err(ErrValue::from_error(&CalcError::Interrupted)),
            Err(Fault::Quit) => {
                self.quit = true;
                Ok(self.last.take())
            }
        }
    }

    /// Run a script file (startup resources, `-q` skips these).
    pub fn load_file(&mut self, path: &str) -> Result<(), ErrValue> {
        if self.config.resource_debug & 1 != 0 {
            debug!("loading resource file {}", path);
        }
        let src = self
            .files
            .read_source(path)
            .map_err(|e| ErrValue::from_error(&e))?;
        self.eval_str(&src).map(|_| ())
    }

    // -- symbols -------------------------------------------------------

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    pub fn set_global(&mut self, name: &str, v: Value) {
        self.globals.insert(name.to_string(), v);
    }

    pub fn function(&self, name: &str) -> Option<FuncRef> {
        self.funcs.get(name).cloned()
    }

    pub fn define_function(&mut self, f: Function) {
        self.funcs.insert(f.name.clone(), Rc::new(f));
    }

    // -- object types --------------------------------------------------

    pub fn register_objtype(
        &mut self,
        name: &str,
        fields: Vec<String>,
    ) -> Result<usize, CalcError> {
        if let Some(&id) = self.objtype_ids.get(name) {
            // redefinition keeps the id so existing instances stay valid
            self.objtypes[id].fields = fields;
            return Ok(id);
        }
        let id = self.objtypes.len();
        self.objtypes.push(ObjType {
            name: name.to_string(),
            fields,
        });
        self.objtype_ids.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn objtype_id(&self, name: &str) -> Option<usize> {
        self.objtype_ids.get(name).copied()
    }

    pub fn objtype(&self, id: usize) -> Option<&ObjType> {
        self.objtypes.get(id)
    }

    pub fn objtypes(&self) -> &[ObjType] {
        &self.objtypes
    }

    // -- statics -------------------------------------------------------

    /// Slot for a per-function static; re-registering resets the
    /// stored value (the function was recompiled).
    pub fn alloc_static(&mut self, key: &str, initial: Value) -> usize {
        if let Some(&slot) = self.static_slots.get(key) {
            self.statics[slot] = initial;
            return slot;
        }
        let slot = self.statics.len();
        self.statics.push(initial);
        self.static_slots.insert(key.to_string(), slot);
        slot
    }

    pub fn static_value(&self, slot: usize) -> Value {
        self.statics.get(slot).cloned().unwrap_or(Value::Null)
    }

    pub fn set_static(&mut self, slot: usize, v: Value) {
        if slot < self.statics.len() {
            self.statics[slot] = v;
        }
    }

    // -- interrupt / quit ---------------------------------------------

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Observe and clear the interrupt flag.
    pub fn check_interrupt(&self) -> bool {
        if self.interrupt.load(Ordering::Relaxed) {
            self.interrupt.store(false, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    // -- output --------------------------------------------------------

    /// Capture emitted lines instead of printing them (tests and the
    /// `-e` expression mode use this).
    pub fn capture_output(&mut self) {
        self.captured = Some(Vec::new());
    }

    pub fn take_captured(&mut self) -> Vec<String> {
        self.captured.replace(Vec::new()).unwrap_or_default()
    }

    pub fn emit_line(&mut self, s: String) {
        match &mut self.captured {
            Some(buf) => buf.push(s),
            None => println!("{}", s),
        }
    }

    /// A top-level expression produced a value: remember it and echo
    /// under the REPL.
    pub fn note_result(&mut self, v: Value) {
        if self.echo {
            let s = display::format_value(&v, &self.config, &self.objtypes);
            self.emit_line(s);
        }
        self.last = Some(v);
    }

    pub fn last_value(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    /// Render a value under the current configuration.
    pub fn render(&self, v: &Value) -> String {
        display::format_value(v, &self.config, &self.objtypes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::Signed;

    #[test]
    fn globals_persist_across_evaluations() {
        let mut eng = Engine::new();
        eng.eval_str("x = 41;").unwrap();
        let r = eng.eval_str("x + 1;").unwrap();
        assert_eq!(r, Some(Value::from_i64(42)));
    }

    #[test]
    fn functions_persist_across_evaluations() {
        let mut eng = Engine::new();
        eng.eval_str("define twice(n) { return 2 * n; }").unwrap();
        let r = eng.eval_str("twice(21);").unwrap();
        assert_eq!(r, Some(Value::from_i64(42)));
    }

    #[test]
    fn echo_captures_formatted_output() {
        let mut eng = Engine::new();
        eng.echo = true;
        eng.capture_output();
        eng.eval_str("1/4;").unwrap();
        assert_eq!(eng.take_captured(), vec![".25".to_string()]);
    }

    #[test]
    fn print_statement_writes_lines() {
        let mut eng = Engine::new();
        eng.capture_output();
        eng.eval_str("print 1, 2, \"three\";").unwrap();
        assert_eq!(eng.take_captured(), vec!["1 2 three".to_string()]);
    }

    #[test]
    fn parse_error_reports_code() {
        let mut eng = Engine::new();
        let r = eng.eval_str("1 +;");
        assert!(r.is_err());
        assert_eq!(r.unwrap_err().code, 501);
    }

    #[test]
    fn undefined_variable_reports_lookup_error() {
        let mut eng = Engine::new();
        let r = eng.eval_str("nosuchvar + 1;");
        assert!(r.is_err());
        assert_eq!(r.unwrap_err().code, 401);
    }

    #[test]
    fn objtype_redefinition_keeps_id() {
        let mut eng = Engine::new();
        let a = eng
            .register_objtype("point", vec!["x".into(), "y".into()])
            .unwrap();
        let b = eng
            .register_objtype("point", vec!["x".into(), "y".into(), "z".into()])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(eng.objtype(a).unwrap().fields.len(), 3);
    }

    #[test]
    fn config_epsilon_drives_transcendentals() {
        let mut eng = Engine::new();
        eng.eval_str("config(\"epsilon\", 1/100);").unwrap();
        // pi at two digits
        let r = eng.eval_str("pi();").unwrap().unwrap();
        let q = r.as_num().unwrap().clone();
        let pi = crate::transc::pi_q(&num_rational::BigRational::new(
            1.into(),
            1_000_000.into(),
        ))
        .unwrap();
        assert!((q - pi).abs() < num_rational::BigRational::new(1.into(), 100.into()));
    }

    #[test]
    fn load_file_runs_script() {
        let dir = std::env::temp_dir();
        let path = dir.join("ratcalc_engine_test.cal");
        std::fs::write(&path, "global seeded = 123;").unwrap();
        let mut eng = Engine::new();
        eng.load_file(path.to_str().unwrap()).unwrap();
        assert_eq!(eng.global("seeded"), Some(Value::from_i64(123)));
        let _ = std::fs::remove_file(path);
    }
}
