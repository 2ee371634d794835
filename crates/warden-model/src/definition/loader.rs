use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::{Env, ModelError, ModelResult, ServiceDefinition, TimeoutSecs};

type Object = Map<String, Value>;

pub(super) fn load(raw: &str) -> ModelResult<ServiceDefinition> {
    let doc: Value = serde_json::from_str(raw)
        .map_err(|e| ModelError::InvalidDefinition(format!("not a JSON document: {e}")))?;
    let obj = doc
        .as_object()
        .ok_or_else(|| ModelError::InvalidDefinition("top level must be an object".into()))?;

    Ok(ServiceDefinition {
        cmd: path(obj, "cmd")?,
        argv: argv(obj)?,
        env: env(obj)?,
        cwd: path(obj, "cwd")?,
        stdin: path(obj, "stdin")?,
        stdout: path(obj, "stdout")?,
        stderr: path(obj, "stderr")?,
        uid: id(obj, "uid")?,
        gid: id(obj, "gid")?,
        timeout: timeout(obj)?,
    })
}

/// Look up a required field; JSON `null` counts as absent.
fn field<'a>(obj: &'a Object, name: &'static str) -> ModelResult<&'a Value> {
    match obj.get(name) {
        None | Some(Value::Null) => Err(ModelError::MissingField(name)),
        Some(v) => Ok(v),
    }
}

fn path(obj: &Object, name: &'static str) -> ModelResult<PathBuf> {
    let s = field(obj, name)?
        .as_str()
        .ok_or_else(|| invalid(name, "expected a string"))?;
    if s.trim().is_empty() {
        return Err(invalid(name, "must not be empty"));
    }
    let p = PathBuf::from(s);
    if !p.is_absolute() {
        return Err(invalid(name, &format!("'{s}' is not an absolute path")));
    }
    Ok(p)
}

fn argv(obj: &Object) -> ModelResult<Vec<String>> {
    let arr = field(obj, "argv")?
        .as_array()
        .ok_or_else(|| invalid("argv", "expected an array of strings"))?;
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_owned)
                .ok_or_else(|| invalid("argv", "expected an array of strings"))
        })
        .collect()
}

fn env(obj: &Object) -> ModelResult<Env> {
    let map = match obj.get("env") {
        None | Some(Value::Null) => return Ok(Env::baseline()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(invalid("env", "expected an object of strings")),
    };

    let mut env = Env::new();
    for (k, v) in map {
        if k.is_empty() || k.contains('=') {
            return Err(invalid("env", &format!("bad variable name '{k}'")));
        }
        let v = v
            .as_str()
            .ok_or_else(|| invalid("env", &format!("value of '{k}' must be a string")))?;
        env.insert(k.as_str(), v);
    }
    Ok(env.or_baseline())
}

fn id(obj: &Object, name: &'static str) -> ModelResult<u32> {
    let n = field(obj, name)?
        .as_u64()
        .ok_or_else(|| invalid(name, "expected a non-negative integer"))?;
    u32::try_from(n).map_err(|_| invalid(name, "out of range"))
}

fn timeout(obj: &Object) -> ModelResult<TimeoutSecs> {
    let secs = field(obj, "timeout")?
        .as_u64()
        .ok_or_else(|| invalid("timeout", "expected an integer >= 0"))?;
    if secs > 0 {
        return Err(ModelError::Unsupported(format!(
            "service timeout of {secs}s requested; only 0 (no timeout) is implemented"
        )));
    }
    Ok(secs)
}

fn invalid(name: &str, why: &str) -> ModelError {
    ModelError::InvalidDefinition(format!("{name}: {why}"))
}
