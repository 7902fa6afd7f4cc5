//! 能力角色的工具类别
//!
//! 每个能力角色提供一个以角色名命名的 ToolCategory。工具本体只是字符串模板，
//! 参数由带 JsonSchema 的结构体声明，分发器据此校验。

pub mod diagram_developer;
pub mod solution_architect;
pub mod verification_assistant;

/// 列表参数拼成 "a, b, c"
pub(crate) fn join(items: &[String]) -> String {
    items.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::build_catalog;

    #[test]
    fn test_join() {
        assert_eq!(join(&["a".to_string(), "b".to_string()]), "a, b");
        assert_eq!(join(&[]), "");
    }

    #[test]
    fn test_shipped_categories_are_valid_and_distinct() {
        let categories = [
            solution_architect::category(),
            diagram_developer::category(),
            verification_assistant::category(),
        ];
        for category in &categories {
            category.validate().unwrap();
            assert!(!category.is_empty());
        }
        let catalog = build_catalog(categories.iter()).unwrap();
        let total: usize = categories.iter().map(|c| c.len()).sum();
        assert_eq!(catalog.len(), total);
    }
}
