//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / 测试脚本）实现 LlmClient：给定消息序列返回一段完成文本。

use async_trait::async_trait;

use crate::memory::Message;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；错误以字符串返回，由调用方包装成 AgentError::LlmError
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}
