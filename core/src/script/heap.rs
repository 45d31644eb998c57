//! Allocation accounting for one script run.
//!
//! Every array and object a script creates is registered here, so the whole graph
//! can be emptied when the run ends, reference cycles included. Sizes are charged
//! against [`ScriptLimits::max_heap_bytes`](super::ScriptLimits).

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

use super::value::{ArrayRef, Object, ObjectRef, TextOverflow, Value};
use super::{ScriptError, ScriptResult};

/// Charge for an array or object beyond its elements.
const CONTAINER_BYTES: usize = 64;
const VALUE_BYTES: usize = mem::size_of::<Value>();
const ENTRY_BYTES: usize = mem::size_of::<(String, Value)>();

pub struct Heap {
    limit: usize,
    used: Cell<usize>,
    arrays: RefCell<Vec<ArrayRef>>,
    objects: RefCell<Vec<ObjectRef>>,
}

impl Heap {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: Cell::new(0),
            arrays: RefCell::new(Vec::new()),
            objects: RefCell::new(Vec::new()),
        }
    }

    pub fn used(&self) -> usize {
        self.used.get()
    }

    pub fn reset_usage(&self) {
        self.used.set(0);
    }

    /// Bytes left before the budget is spent.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used.get())
    }

    pub fn exhausted(&self) -> ScriptError {
        ScriptError::Budget(format!(
            "script exceeded the memory budget of {} bytes",
            self.limit
        ))
    }

    pub fn charge(&self, bytes: usize) -> ScriptResult<()> {
        let used = self.used.get().saturating_add(bytes);
        if used > self.limit {
            return Err(self.exhausted());
        }
        self.used.set(used);
        Ok(())
    }

    /// Charge for `count` array slots.
    pub fn charge_values(&self, count: usize) -> ScriptResult<()> {
        self.charge(count.saturating_mul(VALUE_BYTES))
    }

    /// Charge for a property about to be added to an object.
    pub fn charge_entry(&self, key: &str) -> ScriptResult<()> {
        self.charge(ENTRY_BYTES.saturating_add(key.len()))
    }

    pub fn string(&self, text: String) -> ScriptResult<Value> {
        self.charge(text.len())?;
        Ok(Value::string(text))
    }

    pub fn array(&self, items: Vec<Value>) -> ScriptResult<Value> {
        let value = Value::array(items);
        self.adopt(&value)?;
        Ok(value)
    }

    pub fn object(&self, object: Object) -> ScriptResult<Value> {
        self.charge(CONTAINER_BYTES)?;
        for (key, _) in object.entries() {
            self.charge_entry(key)?;
        }
        let object = Rc::new(RefCell::new(object));
        self.objects.borrow_mut().push(object.clone());
        Ok(Value::Object(object))
    }

    /// Register an array built outside the interpreter, such as a primitive's result.
    pub fn adopt(&self, value: &Value) -> ScriptResult<()> {
        match value {
            Value::Array(items) => {
                self.charge(CONTAINER_BYTES)?;
                self.charge_values(items.borrow().len())?;
                self.arrays.borrow_mut().push(items.clone());
            }
            Value::Object(object) => {
                self.charge(CONTAINER_BYTES)?;
                self.objects.borrow_mut().push(object.clone());
            }
            _ => {}
        }
        Ok(())
    }

    /// Map a failed text conversion to the error a script sees.
    pub fn text_error(&self, overflow: TextOverflow) -> ScriptError {
        match overflow {
            TextOverflow::Length => self.exhausted(),
            TextOverflow::Depth => ScriptError::Range("Maximum call stack size exceeded".into()),
        }
    }

    /// Empty every registered container.
    ///
    /// The registry keeps each container alive until all of them are empty, so
    /// dropping contents never recurses through a long chain of arrays.
    pub fn release(&self) {
        let arrays = mem::take(&mut *self.arrays.borrow_mut());
        let objects = mem::take(&mut *self.objects.borrow_mut());
        for array in &arrays {
            let items = mem::take(&mut *array.borrow_mut());
            drop(items);
        }
        for object in &objects {
            object.borrow_mut().clear();
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.release();
    }
}
