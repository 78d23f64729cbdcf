use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::types::{Tool, ToolCall};

use super::registry::FunctionRegistry;

/// 一次函数调用的记录，会写进 Agent 响应的 info
#[derive(Debug, Clone, Serialize)]
pub struct FunctionCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub result: String,
    pub succeeded: bool,
}

/// 工具执行器 - 解析参数并按顺序执行模型请求的函数调用
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<FunctionRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        ToolExecutor { registry }
    }

    /// 获取所有工具定义
    pub fn get_tools(&self) -> Vec<Tool> {
        self.registry.get_tools()
    }

    /// 给缺少 id 的调用补上 id
    pub fn normalize(tool_calls: &[ToolCall]) -> Vec<ToolCall> {
        tool_calls
            .iter()
            .enumerate()
            .map(|(i, call)| {
                let mut call = call.clone();
                if call.id.is_empty() {
                    call.id = format!("call_{}", call.function.index.unwrap_or(i as u32));
                }
                call
            })
            .collect()
    }

    /// 执行失败不会中断，错误文本作为结果返回给模型
    pub async fn execute_tool_calls(&self, tool_calls: &[ToolCall]) -> Vec<FunctionCallRecord> {
        let mut results = Vec::with_capacity(tool_calls.len());

        for tool_call in tool_calls {
            let name = tool_call.function.name.clone();
            let arguments = tool_call.function.arguments.clone();

            let args = match parse_arguments(&arguments) {
                Ok(args) => args,
                Err(e) => {
                    let error_msg = format!("工具参数解析失败：{}", e);
                    warn!(tool = %name, error = %e, "工具参数解析失败");
                    results.push(FunctionCallRecord {
                        id: tool_call.id.clone(),
                        name,
                        arguments,
                        result: error_msg,
                        succeeded: false,
                    });
                    continue;
                }
            };

            info!(tool = %name, "调用工具");

            let (result, succeeded) = match self.registry.execute(&name, &args).await {
                Ok(res) => (res, true),
                Err(e) => {
                    warn!(tool = %name, error = %e, "工具执行失败");
                    (format!("工具执行失败：{}", e), false)
                }
            };

            results.push(FunctionCallRecord {
                id: tool_call.id.clone(),
                name,
                arguments,
                result,
                succeeded,
            });
        }

        results
    }
}

/// 参数可能是 JSON 对象，也可能是 JSON 字符串
fn parse_arguments(arguments: &Value) -> serde_json::Result<HashMap<String, Value>> {
    if arguments.is_object() {
        serde_json::from_value(arguments.clone())
    } else {
        let args_str = arguments.as_str().unwrap_or("{}");
        serde_json::from_str(args_str)
    }
}
