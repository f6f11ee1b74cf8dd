//! Advisory safe/destructive classification of discovered operations.
//!
//! Classification only gates which operations are exposed by default. It is
//! a naming heuristic and never a permission check.

use crate::provider::domain::HttpMethod;
use crate::tool_registry::domain::OperationClass;

const DESTRUCTIVE_VERBS: [&str; 10] = [
    "delete", "remove", "destroy", "purge", "erase", "revoke", "wipe", "drop", "terminate",
    "disable",
];

const ADMINISTRATIVE_RESOURCES: [&str; 15] = [
    "admin",
    "permission",
    "member",
    "collaborator",
    "user",
    "key",
    "token",
    "secret",
    "hook",
    "webhook",
    "setting",
    "role",
    "protection",
    "policy",
    "visibility",
];

/// Classifies an operation from its method, path and naming.
///
/// `DELETE` and any destructive verb are destructive. `GET` and `HEAD` are
/// always safe. Other state-changing calls are destructive when they touch
/// an administrative resource such as members, keys or branch protection.
#[must_use]
pub fn classify(method: HttpMethod, path: &str, operation_id: Option<&str>) -> OperationClass {
    if method == HttpMethod::Delete {
        return OperationClass::Destructive;
    }
    if !method.is_state_changing() {
        return OperationClass::Safe;
    }

    let mut tokens = words(operation_id.unwrap_or_default());
    tokens.extend(
        path.split('/')
            .filter(|segment| !segment.starts_with('{'))
            .flat_map(words),
    );

    let destructive_verb = tokens
        .iter()
        .any(|token| DESTRUCTIVE_VERBS.contains(&token.as_str()));
    let administrative = tokens
        .iter()
        .any(|token| ADMINISTRATIVE_RESOURCES.contains(&singular(token).as_str()));

    if destructive_verb || administrative {
        OperationClass::Destructive
    } else {
        OperationClass::Safe
    }
}

/// Splits camelCase, kebab-case and snake_case text into lowercase words.
#[must_use]
pub fn words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for character in text.chars() {
        if !character.is_ascii_alphanumeric() {
            flush(&mut words, &mut current);
            previous_lower = false;
            continue;
        }
        if character.is_ascii_uppercase() && previous_lower {
            flush(&mut words, &mut current);
        }
        previous_lower = character.is_ascii_lowercase() || character.is_ascii_digit();
        current.push(character.to_ascii_lowercase());
    }
    flush(&mut words, &mut current);
    words
}

fn flush(words: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    word.strip_suffix('s').unwrap_or(word).to_owned()
}
