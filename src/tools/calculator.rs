use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct Calculator;

fn number(args: &Value, key: &str) -> Result<f64> {
    args[key]
        .as_f64()
        .ok_or_else(|| AppError::InvalidInput(format!("'{}' must be a number", key)))
}

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform basic arithmetic operations"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"]
                },
                "a": { "type": "number" },
                "b": { "type": "number" }
            },
            "required": ["operation", "a", "b"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let op = args["operation"]
            .as_str()
            .ok_or_else(|| AppError::InvalidInput("operation is required".into()))?;
        let a = number(&args, "a")?;
        let b = number(&args, "b")?;

        let result = match op {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" if b == 0.0 => {
                return Err(AppError::InvalidInput("Division by zero".into()));
            }
            "divide" => a / b,
            other => {
                return Err(AppError::InvalidInput(format!(
                    "Unknown operation: {}",
                    other
                )))
            }
        };

        Ok(json!({ "result": result }))
    }
}
