//! diagram_developer：各类架构图的设计描述（不生成图形本身）

use schemars::JsonSchema;
use serde::Deserialize;

use super::join;
use crate::tools::{FunctionTool, ToolCategory};

pub const ROLE: &str = "diagram_developer";

pub const SYSTEM_PROMPT: &str = "You are an AI Diagram Developer Agent. You design solution architecture diagrams: system, sequence, entity-relationship, deployment, data flow and cloud architecture views. Describe each diagram precisely so it can be drawn later.";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SystemDiagramArgs {
    pub system_name: String,
    pub components: Vec<String>,
    /// 如 context、container、block
    pub diagram_type: String,
}

fn create_system_diagram(a: SystemDiagramArgs) -> Result<String, String> {
    Ok(format!(
        "{} diagram created for '{}' showing components: {}.",
        a.diagram_type,
        a.system_name,
        join(&a.components)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ArchitectureDiagramArgs {
    pub project_name: String,
    pub architecture_style: String,
    pub layers: Vec<String>,
}

fn design_architecture_diagram(a: ArchitectureDiagramArgs) -> Result<String, String> {
    Ok(format!(
        "Architecture diagram created for '{}' using {} style with layers: {}.",
        a.project_name,
        a.architecture_style,
        join(&a.layers)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SequenceDiagramArgs {
    pub interaction_name: String,
    pub actors: Vec<String>,
    pub steps: u32,
}

fn create_sequence_diagram(a: SequenceDiagramArgs) -> Result<String, String> {
    if a.actors.len() < 2 {
        return Err("a sequence diagram needs at least two actors".to_string());
    }
    Ok(format!(
        "Sequence diagram created for '{}' showing interaction between {} in {} steps.",
        a.interaction_name,
        join(&a.actors),
        a.steps
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EntityRelationshipArgs {
    pub database_name: String,
    pub entities: Vec<String>,
    pub relationship_types: Vec<String>,
}

fn design_entity_relationship_diagram(a: EntityRelationshipArgs) -> Result<String, String> {
    Ok(format!(
        "Entity-relationship diagram created for '{}' with entities ({}) and relationship types: {}.",
        a.database_name,
        join(&a.entities),
        join(&a.relationship_types)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DeploymentDiagramArgs {
    pub system_name: String,
    pub environments: Vec<String>,
    pub nodes: Vec<String>,
}

fn design_deployment_diagram(a: DeploymentDiagramArgs) -> Result<String, String> {
    Ok(format!(
        "Deployment diagram created for '{}' across environments ({}) with nodes: {}.",
        a.system_name,
        join(&a.environments),
        join(&a.nodes)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DataFlowArgs {
    pub system_name: String,
    pub processes: Vec<String>,
    pub data_stores: Vec<String>,
    pub external_entities: Vec<String>,
}

fn design_data_flow_diagram(a: DataFlowArgs) -> Result<String, String> {
    Ok(format!(
        "Data flow diagram created for '{}' with processes ({}), data stores ({}), and external entities: {}.",
        a.system_name,
        join(&a.processes),
        join(&a.data_stores),
        join(&a.external_entities)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CloudArchitectureArgs {
    pub cloud_platform: String,
    pub services: Vec<String>,
    pub regions: Vec<String>,
}

fn design_cloud_architecture_diagram(a: CloudArchitectureArgs) -> Result<String, String> {
    Ok(format!(
        "Cloud architecture diagram created for {} using services ({}) across regions: {}.",
        a.cloud_platform,
        join(&a.services),
        join(&a.regions)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StateDiagramArgs {
    pub component_name: String,
    pub states: Vec<String>,
    pub transitions: u32,
}

fn design_state_diagram(a: StateDiagramArgs) -> Result<String, String> {
    Ok(format!(
        "State diagram created for '{}' with states ({}) and {} transitions.",
        a.component_name,
        join(&a.states),
        a.transitions
    ))
}

pub fn category() -> ToolCategory {
    ToolCategory::new(ROLE)
        .with_tool(FunctionTool::new(
            "create_system_diagram",
            "Create a system diagram showing the components of a system.",
            create_system_diagram,
        ))
        .with_tool(FunctionTool::new(
            "design_architecture_diagram",
            "Design an architecture diagram with specified layers and style.",
            design_architecture_diagram,
        ))
        .with_tool(FunctionTool::new(
            "create_sequence_diagram",
            "Create a sequence diagram showing interactions between actors.",
            create_sequence_diagram,
        ))
        .with_tool(FunctionTool::new(
            "design_entity_relationship_diagram",
            "Design an entity-relationship diagram for a database.",
            design_entity_relationship_diagram,
        ))
        .with_tool(FunctionTool::new(
            "design_deployment_diagram",
            "Design a deployment diagram showing system deployment across environments.",
            design_deployment_diagram,
        ))
        .with_tool(FunctionTool::new(
            "design_data_flow_diagram",
            "Design a data flow diagram showing processes, data stores, and external entities.",
            design_data_flow_diagram,
        ))
        .with_tool(FunctionTool::new(
            "design_cloud_architecture_diagram",
            "Design a cloud architecture diagram showing services across regions.",
            design_cloud_architecture_diagram,
        ))
        .with_tool(FunctionTool::new(
            "design_state_diagram",
            "Design a state diagram showing states and transitions for a component.",
            design_state_diagram,
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

    #[tokio::test]
    async fn test_sequence_diagram_needs_two_actors() {
        let d = ToolDispatcher::new(Arc::new(category()), Duration::from_secs(5)).unwrap();
        let err = d
            .dispatch(
                "create_sequence_diagram",
                json!({"interaction_name": "login", "actors": ["user"], "steps": 3}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed { .. }));

        let out = d
            .dispatch(
                "create_sequence_diagram",
                json!({"interaction_name": "login", "actors": ["user", "api"], "steps": 3}),
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            "Sequence diagram created for 'login' showing interaction between user, api in 3 steps."
        );
    }
}
