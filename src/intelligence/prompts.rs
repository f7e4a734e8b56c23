//! Prompt construction for thread, meeting and email analysis.
//!
//! Thread and meeting prompts share one JSON answer schema so a single parser
//! (`parse_analysis`) covers every mode.

/// Cap on the email body handed to the one-shot summariser.
pub const EMAIL_BODY_CHAR_LIMIT: usize = 8_000;

const ANSWER_SCHEMA: &str = r#"Return a JSON object with this structure:
{
  "problem_statement": "The problem or topic under discussion",
  "key_participants": ["participant", "names"],
  "timeline_summary": "How the conversation unfolded, oldest to newest",
  "resolution_status": "One of 'Resolved', 'In Progress', 'Pending', 'Unresolved'",
  "customer_sentiment": "One of 'Very Positive', 'Positive', 'Neutral', 'Negative', 'Very Negative'",
  "sentiment_score": <integer from -2 (very negative) to 2 (very positive) matching customer_sentiment>,
  "next_steps": [
    {
      "text": "The action item",
      "owner": "Name or email of whoever owns it, or null",
      "due_date": "YYYY-MM-DD, or null"
    }
  ],
  "feature_requests": [
    {
      "title": "Short generic name for the capability (e.g. 'Bulk User Editing')",
      "customer_description": "One or two sentences on what the customer is asking for",
      "use_case": "The problem the customer is trying to solve",
      "urgency": "'Low', 'Medium' or 'High'",
      "urgency_signals": "The phrasing that shows priority, quoted or paraphrased",
      "customer_impact": "Who is affected and how, in one sentence"
    }
  ]
}
"#;

const FEATURE_REQUEST_RULES: &str = "\
Feature requests:
- A feature request is any place the customer asks for a new capability, suggests an \
improvement, or describes a limitation that implies something is missing.
- Urgency: High blocks a workflow or is time-critical; Medium matters but does not block; \
Low is a nice-to-have.
- Keep titles and descriptions generic enough that similar requests from different \
customers can be grouped, and name them consistently.
- If there are none, return [].
";

const NEXT_STEP_RULES: &str = "\
Next steps:
- Extract only action items that are stated explicitly. Never infer or invent them.
- owner is the responsible person's name or email, or null when nobody is named.
- due_date uses YYYY-MM-DD when a date is given, otherwise null.
- If there are none, return [].
";

const SENTIMENT_GUIDE: &str = "\
Sentiment scale:
- \"Very Positive\" (2): enthusiastic, explicit praise, talk of expansion
- \"Positive\" (1): satisfied, minor issues resolved, optimistic
- \"Neutral\" (0): factual and informational, no complaints and no praise
- \"Negative\" (-1): frustrated or confused, blockers, unhappy with a feature or price
- \"Very Negative\" (-2): angry, threatening to churn, several major issues

The customer is every participant who is not the customer success manager.
";

/// First-pass analysis of a whole email thread.
pub fn build_thread_prompt(transcript: &str) -> String {
    let mut prompt = String::with_capacity(transcript.len() + 4096);
    prompt.push_str(
        "You are an expert customer success analyst. Read the email thread below and \
         produce a structured summary.\n\n",
    );
    prompt.push_str(ANSWER_SCHEMA);
    prompt.push('\n');
    prompt.push_str(FEATURE_REQUEST_RULES);
    prompt.push('\n');
    prompt.push_str(NEXT_STEP_RULES);
    prompt.push('\n');
    prompt.push_str(SENTIMENT_GUIDE);
    prompt.push_str("\nEmail Thread:\n\n");
    prompt.push_str(transcript);
    prompt.push_str("\n\n");
    prompt
}

/// Follow-up analysis over messages that arrived since the last pass.
///
/// The model rewrites the summary to cover the whole history but reports only
/// next steps and feature requests that first appear in the new messages.
pub fn build_incremental_prompt(previous_summary: Option<&str>, transcript: &str) -> String {
    let previous = previous_summary
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("No previous summary");

    let mut prompt = String::with_capacity(transcript.len() + 4096);
    prompt.push_str("You are a customer success analyst updating the analysis of an ongoing email thread.\n\n");
    prompt.push_str(&format!("Summary so far:\n{}\n\n", previous));
    prompt.push_str(
        "1. Rewrite the summary so it merges the earlier context with the new messages and \
         covers the entire conversation.\n\
         2. Report ONLY next steps and feature requests that are new in the messages below. \
         Do not repeat anything already covered by the summary so far.\n\n",
    );
    prompt.push_str(ANSWER_SCHEMA);
    prompt.push('\n');
    prompt.push_str(FEATURE_REQUEST_RULES);
    prompt.push('\n');
    prompt.push_str(NEXT_STEP_RULES);
    prompt.push('\n');
    prompt.push_str(SENTIMENT_GUIDE);
    prompt.push_str("\nNew Messages:\n\n");
    prompt.push_str(transcript);
    prompt.push_str("\n\n");
    prompt
}

/// Analysis of a recorded meeting transcript.
pub fn build_meeting_prompt(title: &str, transcript: &str) -> String {
    let mut prompt = String::with_capacity(transcript.len() + 4096);
    prompt.push_str(&format!(
        "You are an expert customer success analyst. Read the transcript of the meeting \
         \"{}\" and produce a structured summary. Use timeline_summary for a short recap of \
         what was discussed and decided.\n\n",
        title
    ));
    prompt.push_str(ANSWER_SCHEMA);
    prompt.push('\n');
    prompt.push_str(FEATURE_REQUEST_RULES);
    prompt.push('\n');
    prompt.push_str(NEXT_STEP_RULES);
    prompt.push('\n');
    prompt.push_str(SENTIMENT_GUIDE);
    prompt.push_str("\nMeeting Transcript:\n\n");
    prompt.push_str(transcript);
    prompt.push_str("\n\n");
    prompt
}

/// One-shot summary of a single email.
pub fn build_email_summary_prompt(
    subject: Option<&str>,
    sender: Option<&str>,
    snippet: Option<&str>,
    body: Option<&str>,
) -> String {
    let mut sections = Vec::new();
    if let Some(subject) = subject.filter(|s| !s.is_empty()) {
        sections.push(format!("Subject: {}", subject));
    }
    if let Some(sender) = sender.filter(|s| !s.is_empty()) {
        sections.push(format!("From: {}", sender));
    }
    if let Some(snippet) = snippet.filter(|s| !s.is_empty()) {
        sections.push(format!("Snippet: {}", snippet));
    }
    if let Some(body) = body.filter(|s| !s.is_empty()) {
        let capped: String = body.chars().take(EMAIL_BODY_CHAR_LIMIT).collect();
        sections.push(format!("Body:\n{}", capped));
    }
    format!(
        "Summarize the following email in at most 2 concise lines. \
         Focus on the key intent and next steps if any.\n\n{}",
        sections.join("\n\n")
    )
}
