
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date format used in the prompt, e.g. `05 March 2025`
pub const DATE_FORMAT: &str = "%d %B %Y";

/// Language of the instruction template and of the refusal sentence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptLanguage {
    #[default]
    #[serde(rename = "tr")]
    Turkish,
    #[serde(rename = "en")]
    English,
}

impl fmt::Display for PromptLanguage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Turkish => write!(f, "Turkish (tr)"),
            Self::English => write!(f, "English (en)"),
        }
    }
}

/// The sentence the model must answer with when the context lacks the answer
#[inline]
pub fn refusal_sentence(language: PromptLanguage) -> &'static str {
    match language {
        PromptLanguage::Turkish => "Verilen bilgilerle bu soruyu cevaplayamiyorum.",
        PromptLanguage::English => "I cannot answer this question with the given information.",
    }
}

/// Build the grounded-answer instruction for `query`
///
/// Context passages are joined with blank lines in the order given.
#[inline]
pub fn build_prompt<S: AsRef<str>>(
    context: &[S],
    query: &str,
    date: NaiveDate,
    language: PromptLanguage,
) -> String {
    let context = context.iter().map(AsRef::as_ref).join("\n\n");
    let date = date.format(DATE_FORMAT);
    let refusal = refusal_sentence(language);

    match language {
        PromptLanguage::Turkish => format!(
            "Yanitinizi yalnizca saglanan baglama dayandirin.\n\
             Eger verilen baglamda cevap yoksa, \"{refusal}\" deyin.\n\
             Bağlamdaki bilgiler eksik veya yeterli değilse, bunu belirtin.\n\
             \n\
             Bugünün tarihi: {date}.\n\
             \n\
             Bağlam:\n\
             {context}\n\
             \n\
             Soru: {query}\n\
             Cevap:\n"
        ),
        PromptLanguage::English => format!(
            "Base your answer only on the provided context.\n\
             If the context does not contain the answer, say \"{refusal}\"\n\
             If the information in the context is missing or insufficient, say so.\n\
             \n\
             Today's date: {date}.\n\
             \n\
             Context:\n\
             {context}\n\
             \n\
             Question: {query}\n\
             Answer:\n"
        ),
    }
}
