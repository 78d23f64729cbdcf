use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{FunctionDefinition, Tool};

/// 可被 Agent 调用的函数
#[async_trait]
pub trait Function: Send + Sync {
    fn definition(&self) -> FunctionDefinition;

    async fn call(&self, args: &HashMap<String, Value>) -> Result<String>;
}

/// 函数注册表，按注册顺序保存
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: Vec<Arc<dyn Function>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry::default()
    }

    /// 注册函数；同名函数会被替换
    pub fn register(&mut self, function: Arc<dyn Function>) {
        let name = function.definition().name;
        self.functions.retain(|f| f.definition().name != name);
        self.functions.push(function);
    }

    pub fn with(mut self, function: Arc<dyn Function>) -> Self {
        self.register(function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.iter().find(|f| f.definition().name == name)
    }

    /// 转换为 Ollama 的工具定义
    pub fn get_tools(&self) -> Vec<Tool> {
        self.functions
            .iter()
            .map(|f| Tool::function(f.definition()))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.definition().name).collect()
    }

    pub async fn execute(&self, name: &str, args: &HashMap<String, Value>) -> Result<String> {
        match self.get(name) {
            Some(function) => function.call(args).await,
            None => Err(anyhow::anyhow!("未知工具：{}", name)),
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
