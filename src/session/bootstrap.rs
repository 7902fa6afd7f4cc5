//! 会话启动：打开上下文存储、构建目录与工具目录、登记全部 Agent、启动运行时
//!
//! 全有或全无：任一步失败时已建的运行时与存储句柄随之丢弃，调用方不会登记该会话。

use std::sync::Arc;
use std::time::Duration;

use crate::agents::{
    AgentAddress, AgentDeps, AgentDirectory, AgentRole, GroupCoordinator, RoleSpec,
    SessionRuntime, ToolDispatchAgent,
};
use crate::core::{AgentError, SessionSupervisor};
use crate::llm::LlmClient;
use crate::memory::{ContextStoreFactory, SessionContext};
use crate::session::{Session, SessionHandle};
use crate::tools::{build_catalog, ToolCatalog, ToolCategory};

/// 启动一个会话所需的进程级依赖
pub(crate) struct BootstrapDeps<'a> {
    pub roles: &'a [RoleSpec],
    pub llm: Arc<dyn LlmClient>,
    pub store_factory: &'a dyn ContextStoreFactory,
    pub tool_timeout: Duration,
    pub history_window: usize,
}

/// 实例化各角色的工具类别并检查类别名与角色名一致
pub(crate) fn role_categories(
    roles: &[RoleSpec],
) -> Result<Vec<(AgentRole, Arc<ToolCategory>)>, AgentError> {
    let mut categories = Vec::new();
    for spec in roles {
        let Some(make) = spec.tools else { continue };
        let category = make();
        if category.name() != spec.role.name() {
            return Err(AgentError::RegistrationError(format!(
                "tool category {} is registered under role {}",
                category.name(),
                spec.role
            )));
        }
        categories.push((spec.role, Arc::new(category)));
    }
    Ok(categories)
}

pub(crate) fn catalog_for(
    categories: &[(AgentRole, Arc<ToolCategory>)],
) -> Result<ToolCatalog, AgentError> {
    build_catalog(categories.iter().map(|(_, c)| c.as_ref()))
}

pub(crate) async fn bootstrap_session(
    session: Session,
    supervisor: SessionSupervisor,
    deps: BootstrapDeps<'_>,
) -> Result<SessionHandle, AgentError> {
    let session_id = session.id.clone();

    let store = deps.store_factory.open(&session_id).await?;
    let context = SessionContext::new(store, session_id.clone());

    let categories = role_categories(deps.roles)?;
    let catalog = Arc::new(catalog_for(&categories)?);
    let directory = Arc::new(AgentDirectory::build(&session_id, deps.roles)?);
    for required in [AgentRole::Human, AgentRole::Planner] {
        if !directory.contains(required) {
            return Err(AgentError::RegistrationError(format!(
                "role table has no {} role",
                required
            )));
        }
    }

    let mut runtime = SessionRuntime::new(session_id.clone(), supervisor.child_token());
    let base = AgentDeps {
        address: AgentAddress::coordinator(&session_id),
        role: None,
        user_id: session.user_id.clone(),
        llm: deps.llm,
        context: context.clone(),
        tools: None,
        tool_dispatch: None,
        directory: None,
        catalog: None,
        tool_timeout: deps.tool_timeout,
        history_window: deps.history_window,
        system_prompt: String::new(),
    };

    for spec in deps.roles {
        let address = AgentAddress::for_role(&session_id, spec.role);
        let tools = categories
            .iter()
            .find(|(role, _)| *role == spec.role)
            .map(|(_, c)| Arc::clone(c));
        let planning = spec.role == AgentRole::Planner;
        let agent_deps = AgentDeps {
            address: address.clone(),
            role: Some(spec.role),
            tools: tools.clone(),
            tool_dispatch: directory.tool_dispatch_address(spec.role).cloned(),
            directory: planning.then(|| Arc::clone(&directory)),
            catalog: planning.then(|| Arc::clone(&catalog)),
            system_prompt: spec.system_prompt.to_string(),
            ..base.clone()
        };
        runtime.register(address, spec.constructor, agent_deps)?;

        if let Some(dispatch) = directory.tool_dispatch_address(spec.role) {
            let dispatch_deps = AgentDeps {
                address: dispatch.clone(),
                role: Some(spec.role),
                tools,
                ..base.clone()
            };
            runtime.register(dispatch.clone(), ToolDispatchAgent::create, dispatch_deps)?;
        }
    }

    let coordinator_deps = AgentDeps {
        directory: Some(Arc::clone(&directory)),
        catalog: Some(Arc::clone(&catalog)),
        ..base
    };
    runtime.register(
        directory.coordinator().clone(),
        GroupCoordinator::create,
        coordinator_deps,
    )?;

    runtime.start()?;

    tracing::info!(
        session_id = %session_id,
        user_id = %session.user_id,
        agents = runtime.addresses().len(),
        tools = catalog.len(),
        "session bootstrapped"
    );

    Ok(SessionHandle::new(
        session, runtime, context, directory, catalog, supervisor,
    ))
}
