/// 返回 `label`，未启用时返回空占位
pub fn maybe(label: &str, enabled: bool) -> &str {
    if enabled { label } else { "" }
}

/// 去掉空占位，其余标签保持原有顺序
pub fn coalesce(mut labels: Vec<&str>) -> Vec<&str> {
    labels.retain(|label| !label.is_empty());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce() {
        let cases: [(&str, Vec<&str>, Vec<&str>); 6] = [
            ("empty", vec![], vec![]),
            ("head", vec!["", "a", "b", "c"], vec!["a", "b", "c"]),
            ("middle", vec!["a", "b", "", "c", "d"], vec!["a", "b", "c", "d"]),
            ("tail", vec!["a", "b", "c", ""], vec!["a", "b", "c"]),
            (
                "many",
                vec!["", "", "a", "", "", "", "b", "", "c", "d", "", ""],
                vec!["a", "b", "c", "d"],
            ),
            ("all", vec!["", "", ""], vec![]),
        ];
        for (name, input, expected) in cases {
            assert_eq!(coalesce(input), expected, "case {name}");
        }
    }

    #[test]
    fn test_coalesce_idempotent() {
        let once = coalesce(vec!["", "handler", "", "code"]);
        assert_eq!(coalesce(once.clone()), once);
    }

    #[test]
    fn test_maybe() {
        assert_eq!(coalesce(vec!["handler", maybe("method", false), maybe("code", true)]), vec!["handler", "code"]);
    }
}
