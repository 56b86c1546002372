pub mod counter;
pub mod history;
pub mod result;

pub use counter::{CounterFile, DailyCounterRecord};
pub use history::{HistoryEntry, HistoryFile, RequestStatus};
pub use result::NormalizedResult;

use serde::{Deserialize, Deserializer};

/// 反序列化为列表：同时接受数组、单个对象和 null
///
/// 旧版本写出的数据文件在只有一条记录时会退化为单个对象
pub fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "one_or_many")]
        items: Vec<u32>,
    }

    #[test]
    fn normalizes_to_list() {
        let many: Holder = serde_json::from_str(r#"{"items": [1, 2]}"#).unwrap();
        assert_eq!(many.items, vec![1, 2]);

        let one: Holder = serde_json::from_str(r#"{"items": 7}"#).unwrap();
        assert_eq!(one.items, vec![7]);

        let null: Holder = serde_json::from_str(r#"{"items": null}"#).unwrap();
        assert!(null.items.is_empty());

        let absent: Holder = serde_json::from_str("{}").unwrap();
        assert!(absent.items.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Holder>(r#"{"items": "abc"}"#).is_err());
    }
}
