//! Trimming of verbose result fields before they are cached

use serde_json::{Map, Value};

const MAX_NEWS_ITEMS: usize = 5;
const MAX_VISUALIZATIONS: usize = 3;
const MAX_FINANCIAL_KEYS: usize = 20;
const IMPORTANT_FINANCIAL_KEYS: &[&str] = &[
    "revenue",
    "net_income",
    "total_assets",
    "total_liabilities",
    "cash_flow",
    "eps",
    "pe_ratio",
];

/// Cap news items and chart paths, and reduce oversized financial data to its key figures
pub fn optimize_result(mut result: Value) -> Value {
    if let Some(news) = result
        .pointer_mut("/research_data/news_data")
        .and_then(Value::as_array_mut)
    {
        news.truncate(MAX_NEWS_ITEMS);
    }

    if let Some(paths) = result
        .get_mut("visualization_paths")
        .and_then(Value::as_array_mut)
    {
        paths.truncate(MAX_VISUALIZATIONS);
    }

    if let Some(financial) = result
        .get_mut("financial_data")
        .and_then(Value::as_object_mut)
    {
        if financial.len() > MAX_FINANCIAL_KEYS {
            let important: Map<String, Value> = IMPORTANT_FINANCIAL_KEYS
                .iter()
                .filter_map(|k| financial.get(*k).map(|v| (k.to_string(), v.clone())))
                .collect();
            *financial = important;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_caps_news_and_charts() {
        let news: Vec<Value> = (0..12).map(|i| json!({"title": format!("n{}", i)})).collect();
        let result = json!({
            "research_data": {"news_data": news, "reports": [1, 2, 3, 4, 5, 6]},
            "visualization_paths": ["a.png", "b.png", "c.png", "d.png"],
        });
        let trimmed = optimize_result(result);
        assert_eq!(trimmed["research_data"]["news_data"].as_array().unwrap().len(), 5);
        assert_eq!(trimmed["research_data"]["news_data"][0]["title"], "n0");
        assert_eq!(trimmed["research_data"]["reports"].as_array().unwrap().len(), 6);
        assert_eq!(trimmed["visualization_paths"], json!(["a.png", "b.png", "c.png"]));
    }

    #[test]
    fn test_financial_data_reduced_only_when_oversized() {
        let mut wide = Map::new();
        for i in 0..25 {
            wide.insert(format!("metric_{}", i), json!(i));
        }
        wide.insert("revenue".into(), json!(1.0e9));
        wide.insert("eps".into(), json!(2.5));

        let trimmed = optimize_result(json!({ "financial_data": wide }));
        assert_eq!(trimmed["financial_data"], json!({"revenue": 1.0e9, "eps": 2.5}));

        let narrow = json!({"financial_data": {"revenue": 1, "gross_margin": 0.4}});
        assert_eq!(optimize_result(narrow.clone()), narrow);
    }

    #[test]
    fn test_unrelated_shapes_untouched() {
        for value in [json!(null), json!("text"), json!({"research_data": "none"})] {
            assert_eq!(optimize_result(value.clone()), value);
        }
    }
}
