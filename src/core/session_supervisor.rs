//! 会话监管：每个会话一个取消作用域
//!
//! SessionManager 持有根 token，每个会话拿到一个子 token；关闭会话或整体 shutdown 时取消，
//! 该会话内正在进行的 Agent 调用与工具执行随之放弃，不会泄漏。

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理：取消令牌
#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    /// 挂在父作用域下：父 token 取消时本会话一并取消
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            cancel_token: parent.child_token(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 放弃该会话的所有在途调用
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单个任务）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
