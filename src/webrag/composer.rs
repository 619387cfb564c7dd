//! Prompt assembly and answer clean-up for the final synthesis call.

use std::sync::OnceLock;

use regex::Regex;

use super::session::SearchSession;

/// Returned when no sub-query produced any usable search result.
pub const NO_INFORMATION_ANSWER: &str = "I couldn't find reliable information to answer your question. \
Please try rephrasing it or asking about something else.";

/// Answers containing this phrase get no sources section.
pub const NO_INFORMATION_PHRASE: &str = "couldn't find";

const EMPTY_ANSWER: &str = "The sources below may help answer your question, \
but I wasn't able to summarize them.";

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a research assistant. Answer the question using only the context below, \
         which was gathered from web pages. Attribute each claim to the source it came from \
         by naming the site or publication. If the context does not contain the information \
         needed, reply exactly with: \"{NO_INFORMATION_ANSWER}\"\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

fn sentinel() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bEOF\b").expect("static regex"))
}

/// Drops leftover `EOF` markers and surrounding whitespace.
pub fn clean_answer(raw: &str) -> String {
    let cleaned = sentinel().replace_all(raw, "");
    cleaned.trim().to_string()
}

/// Final user-facing text: the cleaned answer, plus a sources section
/// unless the model said it had nothing to go on.
pub fn finish_answer(raw: &str, session: &SearchSession) -> String {
    let mut answer = clean_answer(raw);
    if answer.is_empty() {
        answer = EMPTY_ANSWER.to_string();
    }

    if says_nothing_found(&answer) {
        return answer;
    }

    let sources = render_sources(session);
    if !sources.is_empty() {
        answer.push_str("\n\n");
        answer.push_str(&sources);
    }
    answer
}

/// Whether the model admitted it had nothing to go on. Typographic
/// apostrophes count the same as plain ones.
fn says_nothing_found(answer: &str) -> bool {
    answer
        .to_lowercase()
        .replace(['\u{2019}', '\u{2018}', '\u{02bc}'], "'")
        .contains(NO_INFORMATION_PHRASE)
}

/// One markdown link per distinct url, in the order they were found.
pub fn render_sources(session: &SearchSession) -> String {
    let sources = session.distinct_sources();
    if sources.is_empty() {
        return String::new();
    }

    let mut out = String::from("**Sources:**");
    for source in sources {
        let title = source.title.replace('[', "(").replace(']', ")");
        out.push_str(&format!("\n- [{}]({})", title, source.url));
    }
    out
}
