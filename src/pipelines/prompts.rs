//! Static system prompts for script generation.

use crate::pipelines::entities::Situation;

const SCHOOL_PROMPT: &str = "You are writing a two-person podcast script in the voice of a \
friendly teacher and a curious student. The teacher explains the topic step by step; the \
student asks the questions a listener would ask. Keep each turn short and conversational. \
Respond with JSON matching the requested schema: an ordered `scripts` array of \
`{speaker, text}` turns.";

const EXPERT_PROMPT: &str = "You are writing a two-person podcast script between a domain \
expert and an informed host. The expert goes deep but stays accessible; the host steers \
and summarizes. Keep each turn short. Respond with JSON matching the requested schema: an \
ordered `scripts` array of `{speaker, text}` turns.";

const INTERVIEW_PROMPT: &str = "You are writing a podcast interview script. The interviewer \
asks pointed questions; the guest answers with concrete detail and the occasional anecdote. \
Respond with JSON matching the requested schema: an ordered `scripts` array of \
`{speaker, text}` turns.";

const FRIENDS_PROMPT: &str = "You are writing a casual podcast script between two friends \
chatting about the topic. Keep it light, with natural back-and-forth and short turns. \
Respond with JSON matching the requested schema: an ordered `scripts` array of \
`{speaker, text}` turns.";

const RADIO_PROMPT: &str = "You are writing a podcast script hosted by a seasoned radio \
personality with a sidekick. The host carries the show with energy; the sidekick reacts and \
adds color. Respond with JSON matching the requested schema: an ordered `scripts` array of \
`{speaker, text}` turns.";

/// System prompt for the script-composition call, by conversation style.
pub fn system_prompt(situation: Option<Situation>) -> &'static str {
    match situation {
        None | Some(Situation::School) => SCHOOL_PROMPT,
        Some(Situation::Expert) => EXPERT_PROMPT,
        Some(Situation::Interview) => INTERVIEW_PROMPT,
        Some(Situation::Friends) => FRIENDS_PROMPT,
        Some(Situation::RadioPersonality) => RADIO_PROMPT,
    }
}

/// System prompt that turns retrieval output into composition context.
pub fn context_prompt(context: &str) -> String {
    format!(
        "Use the following retrieved material as the factual basis for the script. Prefer \
it over prior knowledge; do not invent sources.\n\n{context}"
    )
}

/// System prompt for formulating a web search query from the user prompt.
pub fn search_query_prompt(today: &str, prompt: &str) -> String {
    format!(
        "Today is {today}. Derive a single concise web search query that would retrieve \
current material for the podcast topic below. Respond with JSON: {{\"query\": \"...\"}}.\n\n\
Topic: {prompt}"
    )
}

/// System prompt for the feed-vs-search triage call.
pub const TRIAGE_PROMPT: &str = "Decide whether the topic below is better served by a \
curated news feed or by an ad-hoc web search. News-cycle topics (politics, economy, \
breaking technology news, sports results) suit feeds; evergreen or niche topics suit \
search. Respond with JSON: {\"rss_need\": bool, \"field\": one of [\"general\", \
\"social\", \"technology\", \"politics\", \"economy\", \"world\", \"sports\", \
\"entertainment\"], \"keywords\": [..]} where `keywords` are 1-4 terms for filtering \
feed entries.";
