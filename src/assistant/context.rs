//! Pet context block prepended to assistant prompts.
//!
//! The block is delimited by fixed markers so it can be removed again before
//! history or replies reach the user.

use std::fmt::Write as _;

use time::Date;

use crate::pets::repo_types::Pet;

pub const CONTEXT_START: &str = "[Pet context]";
pub const CONTEXT_END: &str = "[End of pet context]";

/// Whole years elapsed between `birth` and `today`; never negative.
pub fn age_in_years(birth: Date, today: Date) -> i32 {
    let mut age = today.year() - birth.year();
    if (u8::from(today.month()), today.day()) < (u8::from(birth.month()), birth.day()) {
        age -= 1;
    }
    age.max(0)
}

/// Pet fields are user text. Brackets and line breaks are rewritten so a
/// field can never close the block early or start a new line inside it.
fn inline(field: &str) -> String {
    field
        .chars()
        .map(|c| match c {
            '[' => '(',
            ']' => ')',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

pub fn build_context(pets: &[Pet], today: Date) -> String {
    let mut out = String::new();
    out.push_str(CONTEXT_START);
    out.push('\n');
    if pets.is_empty() {
        out.push_str("The user has no pets registered yet.\n");
    } else {
        let _ = writeln!(out, "The user has {} pet(s):", pets.len());
        for pet in pets {
            let age = age_in_years(pet.birthdate, today);
            let _ = write!(
                out,
                "- {}: species {}, breed {}, gender {}, age {} year(s), weight {} kg",
                inline(&pet.name),
                inline(&pet.species),
                inline(pet.breed.as_deref().unwrap_or("unknown")),
                pet.gender.as_str(),
                age,
                pet.weight,
            );
            if let Some(notes) = pet.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                let _ = write!(out, ", notes: {}", inline(notes));
            }
            out.push('\n');
        }
    }
    out.push_str(CONTEXT_END);
    out
}

pub fn with_context(context: &str, message: &str) -> String {
    format!("{}\n\n{}", context, message)
}

/// Drop a leading context block, if any. Text without one is returned as is.
pub fn strip_context(text: &str) -> String {
    let trimmed = text.trim_start();
    if !trimmed.starts_with(CONTEXT_START) {
        return text.to_string();
    }
    match trimmed.find(CONTEXT_END) {
        Some(end) => trimmed[end + CONTEXT_END.len()..].trim_start().to_string(),
        None => text.to_string(),
    }
}
