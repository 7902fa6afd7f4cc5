//! verification_assistant：需求、架构、安全、测试覆盖率等的核验

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Deserialize;

use super::join;
use crate::tools::{FunctionTool, ToolCategory};

pub const ROLE: &str = "verification_assistant";

pub const SYSTEM_PROMPT: &str = "You are an AI Verification Assistant Agent. You specialize in validating requirements, architectures, security, performance, compliance, code quality and documentation, and in making sure solutions align with business objectives.";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReviewRequirementsArgs {
    pub project_name: String,
    pub requirements_list: Vec<String>,
}

fn review_requirements(a: ReviewRequirementsArgs) -> Result<String, String> {
    Ok(format!(
        "Requirements for '{}' reviewed: {}.",
        a.project_name,
        join(&a.requirements_list)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ValidateArchitectureArgs {
    pub project_name: String,
    pub architecture_components: Vec<String>,
    pub validation_criteria: Vec<String>,
}

fn validate_solution_architecture(a: ValidateArchitectureArgs) -> Result<String, String> {
    Ok(format!(
        "Solution architecture for '{}' validated against criteria ({}) for components: {}.",
        a.project_name,
        join(&a.validation_criteria),
        join(&a.architecture_components)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SecurityAssessmentArgs {
    pub system_name: String,
    pub security_aspects: Vec<String>,
    pub risk_level: String,
}

fn perform_security_assessment(a: SecurityAssessmentArgs) -> Result<String, String> {
    Ok(format!(
        "Security assessment performed for '{}' examining aspects ({}) with identified risk level: {}.",
        a.system_name,
        join(&a.security_aspects),
        a.risk_level
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PerformanceReviewArgs {
    pub system_name: String,
    pub performance_metrics: Vec<String>,
    pub benchmark_results: BTreeMap<String, String>,
}

fn conduct_performance_review(a: PerformanceReviewArgs) -> Result<String, String> {
    let results = a
        .benchmark_results
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>();
    Ok(format!(
        "Performance review conducted for '{}' measuring metrics ({}) with benchmark results: {}.",
        a.system_name,
        join(&a.performance_metrics),
        join(&results)
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ComplianceArgs {
    pub system_name: String,
    pub compliance_standards: Vec<String>,
    pub compliance_status: String,
}

fn verify_compliance(a: ComplianceArgs) -> Result<String, String> {
    Ok(format!(
        "Compliance verification completed for '{}' against standards ({}) with status: {}.",
        a.system_name,
        join(&a.compliance_standards),
        a.compliance_status
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TestCoverageArgs {
    pub system_name: String,
    pub test_types: Vec<String>,
    /// 0 到 100
    pub coverage_percentage: f64,
}

fn validate_test_coverage(a: TestCoverageArgs) -> Result<String, String> {
    if !(0.0..=100.0).contains(&a.coverage_percentage) {
        return Err(format!(
            "coverage_percentage must be within 0..=100, got {}",
            a.coverage_percentage
        ));
    }
    Ok(format!(
        "Test coverage validated for '{}' including test types ({}) with {}% coverage.",
        a.system_name,
        join(&a.test_types),
        a.coverage_percentage
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CodeReviewArgs {
    pub component_name: String,
    pub code_quality_metrics: Vec<String>,
    pub issues_found: u32,
}

fn perform_code_review(a: CodeReviewArgs) -> Result<String, String> {
    Ok(format!(
        "Code review performed for '{}' assessing metrics ({}) with {} issues identified.",
        a.component_name,
        join(&a.code_quality_metrics),
        a.issues_found
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UsabilityArgs {
    pub system_name: String,
    pub user_personas: Vec<String>,
    /// 0 到 10
    pub usability_score: f64,
}

fn conduct_usability_assessment(a: UsabilityArgs) -> Result<String, String> {
    if !(0.0..=10.0).contains(&a.usability_score) {
        return Err(format!(
            "usability_score must be within 0..=10, got {}",
            a.usability_score
        ));
    }
    Ok(format!(
        "Usability assessment conducted for '{}' using personas ({}) with usability score: {}/10.",
        a.system_name,
        join(&a.user_personas),
        a.usability_score
    ))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BusinessAlignmentArgs {
    pub project_name: String,
    pub business_objectives: Vec<String>,
    pub alignment_assessment: String,
}

fn verify_business_requirements_alignment(a: BusinessAlignmentArgs) -> Result<String, String> {
    Ok(format!(
        "Alignment with business requirements verified for '{}' against objectives ({}) with assessment: {}.",
        a.project_name,
        join(&a.business_objectives),
        a.alignment_assessment
    ))
}

pub fn category() -> ToolCategory {
    ToolCategory::new(ROLE)
        .with_tool(FunctionTool::new(
            "review_requirements",
            "Review requirements for a project to ensure clarity and completeness.",
            review_requirements,
        ))
        .with_tool(FunctionTool::new(
            "validate_solution_architecture",
            "Validate a solution architecture against specified criteria.",
            validate_solution_architecture,
        ))
        .with_tool(FunctionTool::new(
            "perform_security_assessment",
            "Perform a security assessment on a system examining specified aspects.",
            perform_security_assessment,
        ))
        .with_tool(FunctionTool::new(
            "conduct_performance_review",
            "Conduct a performance review of a system based on specified metrics.",
            conduct_performance_review,
        ))
        .with_tool(FunctionTool::new(
            "verify_compliance",
            "Verify compliance of a system against specified standards.",
            verify_compliance,
        ))
        .with_tool(FunctionTool::new(
            "validate_test_coverage",
            "Validate test coverage for a system including specified test types.",
            validate_test_coverage,
        ))
        .with_tool(FunctionTool::new(
            "perform_code_review",
            "Perform a code review for a component assessing code quality metrics.",
            perform_code_review,
        ))
        .with_tool(FunctionTool::new(
            "conduct_usability_assessment",
            "Conduct a usability assessment for a system using specified user personas.",
            conduct_usability_assessment,
        ))
        .with_tool(FunctionTool::new(
            "verify_business_requirements_alignment",
            "Verify that a solution aligns with specified business objectives.",
            verify_business_requirements_alignment,
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
    async fn test_review_requirements() {
        let out = dispatcher()
            .dispatch(
                "review_requirements",
                json!({"project_name": "Hive", "requirements_list": ["auth", "audit"]}),
            )
            .await
            .unwrap();
        assert_eq!(out, "Requirements for 'Hive' reviewed: auth, audit.");
    }

    #[tokio::test]
    async fn test_coverage_out_of_range_fails() {
        let err = dispatcher()
            .dispatch(
                "validate_test_coverage",
                json!({"system_name": "S", "test_types": ["unit"], "coverage_percentage": 140.0}),
            )
            .await
            .unwrap_err();
        match err {
            AgentError::ToolExecutionFailed { tool, message } => {
                assert_eq!(tool, "verification_assistant.validate_test_coverage");
                assert!(message.contains("0..=100"));
            }
            other => panic!("expected ToolExecutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_usability_score_format() {
        let out = dispatcher()
            .dispatch(
                "conduct_usability_assessment",
                json!({"system_name": "S", "user_personas": ["admin"], "usability_score": 7.5}),
            )
            .await
            .unwrap();
        assert!(out.ends_with("with usability score: 7.5/10."), "{out}");
    }
}
