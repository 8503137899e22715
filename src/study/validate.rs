use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::study::{McqItem, QaItem, QuestionCount, StudyError, StudyResult};

pub const MCQ_OPTION_COUNT: usize = 4;

#[derive(Debug, serde::Deserialize)]
struct ItemsEnvelope<T> {
    items: Vec<T>,
}

fn decode_items<T: DeserializeOwned>(value: Value) -> StudyResult<Vec<T>> {
    serde_json::from_value::<ItemsEnvelope<T>>(value)
        .map(|envelope| envelope.items)
        .map_err(|err| StudyError::MalformedResponse(format!("unexpected item layout: {}", err)))
}

/// Models sometimes overshoot the count; extra items are dropped, missing ones are an error.
fn fit_to_count<T>(mut items: Vec<T>, count: QuestionCount, kind: &str) -> StudyResult<Vec<T>> {
    let wanted = count.get();
    if items.len() < wanted {
        return Err(StudyError::SchemaViolation(format!(
            "expected {} {} items, got {}",
            wanted,
            kind,
            items.len()
        )));
    }
    if items.len() > wanted {
        log::warn!(
            "Model returned {} {} items, keeping the first {}",
            items.len(),
            kind,
            wanted
        );
        items.truncate(wanted);
    }
    Ok(items)
}

fn require_text(text: &str, what: &str, position: usize) -> StudyResult<()> {
    if text.trim().is_empty() {
        return Err(StudyError::SchemaViolation(format!(
            "item {} has an empty {}",
            position, what
        )));
    }
    Ok(())
}

pub fn validate_qa(value: Value, count: QuestionCount) -> StudyResult<Vec<QaItem>> {
    let items = fit_to_count(decode_items::<QaItem>(value)?, count, "Q/A")?;
    for (i, item) in items.iter().enumerate() {
        require_text(&item.question, "question", i + 1)?;
        require_text(&item.answer, "answer", i + 1)?;
    }
    Ok(items
        .into_iter()
        .map(|item| QaItem {
            question: item.question.trim().to_string(),
            answer: item.answer.trim().to_string(),
        })
        .collect())
}

pub fn validate_mcq(value: Value, count: QuestionCount) -> StudyResult<Vec<McqItem>> {
    let items = fit_to_count(decode_items::<McqItem>(value)?, count, "MCQ")?;
    for (i, item) in items.iter().enumerate() {
        let position = i + 1;
        require_text(&item.question, "question", position)?;
        if item.options.len() != MCQ_OPTION_COUNT {
            return Err(StudyError::SchemaViolation(format!(
                "item {} has {} options instead of {}",
                position,
                item.options.len(),
                MCQ_OPTION_COUNT
            )));
        }
        for option in &item.options {
            require_text(option, "option", position)?;
        }
        if item.answer_index >= item.options.len() {
            return Err(StudyError::SchemaViolation(format!(
                "item {} has answer_index {} but only {} options",
                position,
                item.answer_index,
                item.options.len()
            )));
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn count(n: usize) -> QuestionCount {
        QuestionCount::new(n).unwrap()
    }

    fn qa_items(n: usize) -> Value {
        let items: Vec<Value> = (1..=n)
            .map(|i| json!({"question": format!("Q{}?", i), "answer": format!("A{}", i)}))
            .collect();
        json!({ "items": items })
    }

    fn mcq(answer_index: i64) -> Value {
        json!({
            "question": "Which gas do plants absorb?",
            "options": ["Oxygen", "Carbon dioxide", "Nitrogen", "Helium"],
            "answer_index": answer_index
        })
    }

    #[test]
    fn exact_count_is_accepted_for_every_offered_count() {
        for n in QuestionCount::ALLOWED {
            let items = validate_qa(qa_items(n), count(n)).unwrap();
            assert_eq!(items.len(), n);
        }
    }

    #[test]
    fn too_few_items_is_a_schema_violation() {
        let err = validate_qa(qa_items(3), count(5)).unwrap_err();
        assert!(matches!(err, StudyError::SchemaViolation(_)));
    }

    #[test]
    fn extra_items_are_truncated() {
        let items = validate_qa(qa_items(7), count(5)).unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[4].question, "Q5?");
    }

    #[test]
    fn missing_items_key_is_malformed() {
        let err = validate_qa(json!({"questions": []}), count(5)).unwrap_err();
        assert!(matches!(err, StudyError::MalformedResponse(_)));
    }

    #[test]
    fn blank_answers_are_rejected() {
        let mut value = qa_items(5);
        value["items"][2]["answer"] = json!("   ");
        assert!(matches!(
            validate_qa(value, count(5)),
            Err(StudyError::SchemaViolation(_))
        ));
    }

    #[test]
    fn qa_text_is_trimmed() {
        let mut value = qa_items(5);
        value["items"][0]["question"] = json!("  What is osmosis?\n");
        let items = validate_qa(value, count(5)).unwrap();
        assert_eq!(items[0].question, "What is osmosis?");
    }

    #[test]
    fn in_range_answer_index_is_accepted() {
        let items: Vec<Value> = (0..5).map(|_| mcq(3)).collect();
        let validated = validate_mcq(json!({ "items": items }), count(5)).unwrap();
        assert_eq!(validated.len(), 5);
        assert_eq!(validated[0].correct_option(), Some("Helium"));
    }

    #[test]
    fn answer_index_past_the_options_is_rejected() {
        let mut items: Vec<Value> = (0..5).map(|_| mcq(1)).collect();
        items[4] = mcq(4);
        let err = validate_mcq(json!({ "items": items }), count(5)).unwrap_err();
        assert!(matches!(err, StudyError::SchemaViolation(_)));
    }

    #[test]
    fn negative_answer_index_is_malformed() {
        let items: Vec<Value> = (0..5).map(|_| mcq(-1)).collect();
        let err = validate_mcq(json!({ "items": items }), count(5)).unwrap_err();
        assert!(matches!(err, StudyError::MalformedResponse(_)));
    }

    #[test]
    fn wrong_option_count_is_rejected() {
        let mut items: Vec<Value> = (0..5).map(|_| mcq(0)).collect();
        items[0]["options"] = json!(["Yes", "No"]);
        let err = validate_mcq(json!({ "items": items }), count(5)).unwrap_err();
        assert!(matches!(err, StudyError::SchemaViolation(_)));
    }
}
