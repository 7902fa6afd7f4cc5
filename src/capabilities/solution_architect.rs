//! solution_architect：需求识别、架构设计、技术选型、迁移与容灾规划

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;

use super::join;
use crate::tools::{FunctionTool, ToolCategory};

pub const ROLE: &str = "solution_architect";

pub const SYSTEM_PROMPT: &str = "You are an AI Solution Architect Agent. You specialize in designing system architectures, evaluating technology stacks, creating integration strategies, and developing technical solutions that address business requirements.";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SystemRequirementsArgs {
    pub project_name: String,
    pub business_needs: String,
    pub technical_constraints: String,
}

fn identify_system_requirements(a: SystemRequirementsArgs) -> Result<String, String> {
    Ok(format!(
        "System requirements for '{}' identified based on business needs ({}) and technical constraints ({}).",
        a.project_name, a.business_needs, a.technical_constraints
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SystemArchitectureArgs {
    pub project_name: String,
    pub components: Vec<String>,
    /// 如 microservices、layered、event-driven
    pub architecture_type: String,
}

fn design_system_architecture(a: SystemArchitectureArgs) -> Result<String, String> {
    if a.components.is_empty() {
        return Err("at least one component is required".to_string());
    }
    Ok(format!(
        "System architecture for '{}' designed using {} architecture with components: {}.",
        a.project_name,
        a.architecture_type,
        join(&a.components)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TechnologyStackArgs {
    pub project_name: String,
    pub requirements: Vec<String>,
    /// 层 → 候选技术，如 {"database": ["PostgreSQL", "CosmosDB"]}
    pub options: BTreeMap<String, Vec<String>>,
}

fn evaluate_technology_stack(a: TechnologyStackArgs) -> Result<String, String> {
    let options = a
        .options
        .iter()
        .map(|(layer, choices)| format!("{}: {}", layer, join(choices)))
        .collect::<Vec<_>>();
    Ok(format!(
        "Technology stack for '{}' evaluated based on requirements ({}) with options: {}.",
        a.project_name,
        join(&a.requirements),
        join(&options)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IntegrationStrategyArgs {
    pub systems: Vec<String>,
    pub integration_approach: String,
}

fn create_integration_strategy(a: IntegrationStrategyArgs) -> Result<String, String> {
    Ok(format!(
        "Integration strategy created for systems ({}) using {} approach.",
        join(&a.systems),
        a.integration_approach
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MigrationPlanArgs {
    pub current_system: String,
    pub target_system: String,
    /// 如 "6 months"
    pub timeline: String,
}

fn develop_migration_plan(a: MigrationPlanArgs) -> Result<String, String> {
    Ok(format!(
        "Migration plan developed for moving from '{}' to '{}' over {}.",
        a.current_system, a.target_system, a.timeline
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ArchitectureReviewArgs {
    pub project_name: String,
    pub focus_areas: Vec<String>,
}

fn conduct_architecture_review(a: ArchitectureReviewArgs) -> Result<String, String> {
    Ok(format!(
        "Architecture review conducted for '{}' focusing on: {}.",
        a.project_name,
        join(&a.focus_areas)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SecurityRequirementsArgs {
    pub system_name: String,
    pub compliance_standards: Vec<String>,
}

fn assess_security_requirements(a: SecurityRequirementsArgs) -> Result<String, String> {
    Ok(format!(
        "Security requirements assessed for '{}' based on compliance standards: {}.",
        a.system_name,
        join(&a.compliance_standards)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DisasterRecoveryArgs {
    pub system_name: String,
    pub recovery_time_objective: String,
}

fn create_disaster_recovery_plan(a: DisasterRecoveryArgs) -> Result<String, String> {
    Ok(format!(
        "Disaster recovery plan created for '{}' with a recovery time objective of {}.",
        a.system_name, a.recovery_time_objective
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ApiArchitectureArgs {
    pub system_name: String,
    pub api_types: Vec<String>,
    pub endpoints: u32,
}

fn design_api_architecture(a: ApiArchitectureArgs) -> Result<String, String> {
    if a.endpoints == 0 {
        return Err("endpoints must be greater than zero".to_string());
    }
    Ok(format!(
        "API architecture designed for '{}' using {} with {} endpoints.",
        a.system_name,
        join(&a.api_types),
        a.endpoints
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CloudMigrationArgs {
    pub system_name: String,
    pub cloud_platform: String,
    /// 如 rehost、refactor、rearchitect
    pub migration_approach: String,
}

fn create_cloud_migration_strategy(a: CloudMigrationArgs) -> Result<String, String> {
    Ok(format!(
        "Cloud migration strategy created for '{}' to {} using {} approach.",
        a.system_name, a.cloud_platform, a.migration_approach
    ))
}

pub fn category() -> ToolCategory {
    ToolCategory::new(ROLE)
        .with_tool(FunctionTool::new(
            "identify_system_requirements",
            "Identify system requirements based on business needs and technical constraints.",
            identify_system_requirements,
        ))
        .with_tool(FunctionTool::new(
            "design_system_architecture",
            "Design a system architecture with specified components and architecture type.",
            design_system_architecture,
        ))
        .with_tool(FunctionTool::new(
            "evaluate_technology_stack",
            "Evaluate technology stack options based on project requirements.",
            evaluate_technology_stack,
        ))
        .with_tool(FunctionTool::new(
            "create_integration_strategy",
            "Create a strategy for integrating multiple systems.",
            create_integration_strategy,
        ))
        .with_tool(FunctionTool::new(
            "develop_migration_plan",
            "Develop a plan for migrating from a current system to a target system.",
            develop_migration_plan,
        ))
        .with_tool(FunctionTool::new(
            "conduct_architecture_review",
            "Conduct a review of an existing architecture focusing on specific areas.",
            conduct_architecture_review,
        ))
        .with_tool(FunctionTool::new(
            "assess_security_requirements",
            "Assess security requirements based on compliance standards.",
            assess_security_requirements,
        ))
        .with_tool(FunctionTool::new(
            "create_disaster_recovery_plan",
            "Create a disaster recovery plan with a specified recovery time objective.",
            create_disaster_recovery_plan,
        ))
        .with_tool(FunctionTool::new(
            "design_api_architecture",
            "Design an API architecture with specified API types and number of endpoints.",
            design_api_architecture,
        ))
        .with_tool(FunctionTool::new(
            "create_cloud_migration_strategy",
            "Create a strategy for migrating a system to the cloud.",
            create_cloud_migration_strategy,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentError;
    use crate::tools::ToolDispatcher;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn dispatcher() -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(category()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_migration_plan() {
        let out = dispatcher()
            .dispatch(
                "develop_migration_plan",
                json!({"current_system": "A", "target_system": "B", "timeline": "6 months"}),
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            "Migration plan developed for moving from 'A' to 'B' over 6 months."
        );
    }

    #[tokio::test]
    async fn test_technology_stack_lists_options_in_key_order() {
        let out = dispatcher()
            .dispatch(
                "evaluate_technology_stack",
                json!({
                    "project_name": "Hive",
                    "requirements": ["low latency"],
                    "options": {"web": ["axum"], "db": ["sqlite", "postgres"]}
                }),
            )
            .await
            .unwrap();
        assert!(out.ends_with("with options: db: sqlite, postgres, web: axum."), "{out}");
    }

    #[tokio::test]
    async fn test_zero_endpoints_fails_in_tool() {
        let err = dispatcher()
            .dispatch(
                "design_api_architecture",
                json!({"system_name": "S", "api_types": ["REST"], "endpoints": 0}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_timeline_is_invalid() {
        let err = dispatcher()
            .dispatch(
                "develop_migration_plan",
                json!({"current_system": "A", "target_system": "B"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));
    }
}
