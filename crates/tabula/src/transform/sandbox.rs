//! Restricted Lua runtime for generated transform code.
//!
//! Code must define a global `transform(x)`. Only the `string`, `math`,
//! `table` and `utf8` libraries are loaded, the file and code loading
//! functions of the base library are removed, and every call runs under an
//! instruction budget and a heap limit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use mlua::{Function, HookTriggers, Lua, LuaOptions, StdLib, Value, VmState};

use crate::config::SandboxSettings;
use crate::error::{Result, TabulaError};
use crate::table::CellValue;

use super::operations::{CellTransform, TransformFault, TransformOutput};

/// Instructions between two budget checks.
const HOOK_INTERVAL: u32 = 1000;

/// Base library functions that reach outside the sandbox.
const REMOVED_GLOBALS: &[&str] = &["dofile", "loadfile", "load", "require", "collectgarbage", "print"];

/// Resource limits for one compiled transform.
#[derive(Debug, Clone, Copy)]
pub struct SandboxLimits {
    pub memory_limit_bytes: usize,
    pub instruction_limit: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        SandboxSettings::default().into()
    }
}

impl From<SandboxSettings> for SandboxLimits {
    fn from(settings: SandboxSettings) -> Self {
        Self {
            memory_limit_bytes: settings.memory_limit_bytes,
            instruction_limit: settings.instruction_limit,
        }
    }
}

/// Compiled transform code.
pub struct LuaTransform {
    lua: Lua,
    function: Function,
    executed: Arc<AtomicU64>,
}

impl LuaTransform {
    /// Load `code` and resolve its `transform` function. Failures are
    /// reported as execution errors at load time.
    pub fn compile(code: &str, limits: SandboxLimits) -> Result<Self> {
        let libs = StdLib::STRING | StdLib::MATH | StdLib::TABLE | StdLib::UTF8;
        let lua = Lua::new_with(libs, LuaOptions::default())
            .map_err(|e| TabulaError::at_load(format!("failed to start interpreter: {}", e)))?;
        lua.set_memory_limit(limits.memory_limit_bytes)
            .map_err(|e| TabulaError::at_load(e.to_string()))?;

        let globals = lua.globals();
        for name in REMOVED_GLOBALS {
            globals
                .set(*name, Value::Nil)
                .map_err(|e| TabulaError::at_load(e.to_string()))?;
        }

        let executed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&executed);
        let budget = limits.instruction_limit;
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
            move |_lua, _debug| {
                let used = counter.fetch_add(u64::from(HOOK_INTERVAL), Ordering::Relaxed)
                    + u64::from(HOOK_INTERVAL);
                if used > budget {
                    return Err(mlua::Error::RuntimeError(format!(
                        "instruction budget of {} exhausted",
                        budget
                    )));
                }
                Ok(VmState::Continue)
            },
        );

        // Top-level code counts against the budget too
        lua.load(code)
            .set_name("transform")
            .exec()
            .map_err(|e| TabulaError::at_load(first_line(&e)))?;

        let function = globals.get::<Function>("transform").map_err(|_| {
            TabulaError::at_load("code must define a global function transform(x)")
        })?;

        Ok(Self {
            lua,
            function,
            executed,
        })
    }

    fn to_lua(&self, value: &CellValue) -> mlua::Result<Value> {
        Ok(match value {
            CellValue::Null => Value::Nil,
            CellValue::Bool(b) => Value::Boolean(*b),
            CellValue::Integer(i) => Value::Integer(*i),
            CellValue::Float(f) => Value::Number(*f),
            CellValue::Text(s) => Value::String(self.lua.create_string(s)?),
            CellValue::Json(v) => Value::String(self.lua.create_string(v.to_string())?),
        })
    }
}

fn from_lua(value: Value) -> std::result::Result<CellValue, TransformFault> {
    match value {
        Value::Nil => Ok(CellValue::Null),
        Value::Boolean(b) => Ok(CellValue::Bool(b)),
        Value::Integer(i) => Ok(CellValue::Integer(i)),
        Value::Number(n) if n.is_nan() => Ok(CellValue::Null),
        Value::Number(n) => Ok(CellValue::Float(n)),
        Value::String(s) => Ok(CellValue::Text(s.to_string_lossy().to_string())),
        other => Err(TransformFault::new(format!(
            "transform returned an unsupported {} value",
            other.type_name()
        ))),
    }
}

/// Quote `text` as a Lua string literal.
pub fn lua_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    quoted.push_str(&format!("\\{:03}", byte));
                }
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn first_line(error: &mlua::Error) -> String {
    let text = error.to_string();
    text.lines().next().unwrap_or_default().to_string()
}

impl CellTransform for LuaTransform {
    fn apply(&self, value: &CellValue) -> std::result::Result<TransformOutput, TransformFault> {
        self.executed.store(0, Ordering::Relaxed);
        let argument = self
            .to_lua(value)
            .map_err(|e| TransformFault::new(first_line(&e)))?;

        let result: Value = self
            .function
            .call(argument)
            .map_err(|e| TransformFault::new(first_line(&e)))?;

        match result {
            Value::Table(table) => {
                let mut fields = IndexMap::new();
                for pair in table.pairs::<String, Value>() {
                    let (key, value) = pair.map_err(|e| TransformFault::new(first_line(&e)))?;
                    fields.insert(key, from_lua(value)?);
                }
                Ok(TransformOutput::Fields(fields))
            }
            other => Ok(TransformOutput::Value(from_lua(other)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(code: &str) -> LuaTransform {
        LuaTransform::compile(code, SandboxLimits::default()).unwrap()
    }

    #[test]
    fn test_uppercase() {
        let t = compile("function transform(x) return string.upper(x) end");
        assert_eq!(
            t.apply(&"alice".into()).unwrap(),
            TransformOutput::Value("ALICE".into())
        );
    }

    #[test]
    fn test_numbers_and_nil() {
        let t = compile(
            "function transform(x)
               local n = tonumber(x)
               if n == nil then return nil end
               return n * 2
             end",
        );
        assert_eq!(
            t.apply(&"21".into()).unwrap(),
            TransformOutput::Value(CellValue::Integer(42))
        );
        assert_eq!(
            t.apply(&"abc".into()).unwrap(),
            TransformOutput::Value(CellValue::Null)
        );
    }

    #[test]
    fn test_table_result_is_a_derived_row() {
        let t = compile("function transform(x) return { name = string.upper(x), initial = x:sub(1, 1) } end");
        let TransformOutput::Fields(fields) = t.apply(&"bob".into()).unwrap() else {
            panic!("expected fields");
        };
        assert_eq!(fields.get("name"), Some(&CellValue::from("BOB")));
        assert_eq!(fields.get("initial"), Some(&CellValue::from("b")));
    }

    #[test]
    fn test_runtime_error_is_a_fault() {
        let t = compile("function transform(x) return x.missing.field end");
        assert!(t.apply(&"a".into()).is_err());
    }

    #[test]
    fn test_syntax_error_fails_at_load() {
        let err = LuaTransform::compile("function transform(x", SandboxLimits::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            TabulaError::TransformExecution { row: crate::error::RowRef(None), .. }
        ));
    }

    #[test]
    fn test_missing_transform_function() {
        let err = LuaTransform::compile("local y = 1", SandboxLimits::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("transform(x)"));
    }

    #[test]
    fn test_infinite_loop_exhausts_budget() {
        let limits = SandboxLimits {
            memory_limit_bytes: 1 << 24,
            instruction_limit: 50_000,
        };
        let t = LuaTransform::compile("function transform(x) while true do end end", limits).unwrap();
        let fault = t.apply(&"a".into()).unwrap_err();
        assert!(fault.0.contains("budget"));

        // The budget is per call, so a cheap call afterwards still works
        let t = LuaTransform::compile("function transform(x) return x end", limits).unwrap();
        assert!(t.apply(&"a".into()).is_ok());
    }

    #[test]
    fn test_quoted_strings_round_trip() {
        let text = "say \"hi\"\\n\tend\u{1}";
        let code = format!("function transform(x) return {} end", lua_quote(text));
        let t = compile(&code);
        assert_eq!(
            t.apply(&CellValue::Null).unwrap(),
            TransformOutput::Value(text.into())
        );
    }

    #[test]
    fn test_file_access_is_removed() {
        let t = compile("function transform(x) return dofile(x) end");
        assert!(t.apply(&"/etc/passwd".into()).is_err());
        let t = compile("function transform(x) return type(io) end");
        assert_eq!(
            t.apply(&"".into()).unwrap(),
            TransformOutput::Value("nil".into())
        );
    }
}
