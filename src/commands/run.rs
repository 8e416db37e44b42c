use std::path::Path;

use tracing::debug;

use super::read_source;
use crate::core::diagnostics::report_pipeline_error;
use crate::core::interpreter::RuntimeOptions;
use crate::core::value::Value;
use crate::core::Runtime;

/// Run a script file. Returns the process exit code.
pub fn main_with_opts(input: &Path, options: RuntimeOptions, pretty: bool) -> anyhow::Result<i32> {
    let source = read_source(input)?;
    let filename = input.display().to_string();
    let mut runtime = Runtime::new(options);
    match runtime.run_source(&source, &filename) {
        Ok(value) => {
            debug!(result = %value.type_name(), "script finished");
            if let Some(text) = render_result(&value)? {
                println!("{}", text);
            }
            Ok(0)
        }
        Err(err) => {
            report_pipeline_error(&filename, &source, &err, pretty);
            Ok(1)
        }
    }
}

/// Host form of a script result: strings bare, other values as JSON, nothing for null.
pub fn render_result(value: &Value) -> anyhow::Result<Option<String>> {
    Ok(match value {
        Value::Null => None,
        Value::Str(s) => Some(s.to_string()),
        other => Some(serde_json::to_string(&other.to_host())?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_render_in_host_form() {
        assert_eq!(render_result(&Value::Null).unwrap(), None);
        assert_eq!(render_result(&Value::from("hi")).unwrap().as_deref(), Some("hi"));
        let arr = Value::array(vec![Value::Int(1), Value::from("a"), Value::Bool(true)]);
        assert_eq!(render_result(&arr).unwrap().as_deref(), Some("[1,\"a\",true]"));
        assert_eq!(render_result(&Value::Float(3.0)).unwrap().as_deref(), Some("3.0"));
    }
}
