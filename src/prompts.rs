//! Prompt templates for the two generation stages.
//!
//! The sentinel policy lives entirely in the SQL prompt text: nothing in
//! code stops the model from replying with something that is neither SQL
//! nor the sentinel, and such a reply goes straight to execution.

use crate::session::ChatMessage;

/// Reserved reply the SQL prompt instructs the model to produce when a
/// question cannot be answered from the schema. The orchestrator matches
/// it exactly, after trimming.
pub const SQL_SENTINEL: &str = "NOT_A_DATABASE_QUESTION";

/// Transcript rendered as alternating role-tagged lines.
pub fn render_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|message| match message {
            ChatMessage::User(text) => format!("User: {}", text),
            ChatMessage::Assistant(text) => format!("Assistant: {}", text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn sql_prompt(schema: &str, history: &[ChatMessage], question: &str) -> String {
    format!(
        "You are a data analyst at a company. You are interacting with a user who is \
         asking you questions about the company's database.\n\
         Based on the table schema below, write a SQL query that would answer the user's \
         question. Take the conversation history into account.\n\n\
         <SCHEMA>{schema}</SCHEMA>\n\n\
         Conversation History: {history}\n\n\
         IMPORTANT: Only generate SQL queries for questions that can be answered using \
         the database schema. If the question is about general programming, technology, \
         or anything not related to the database, respond with \"{sentinel}\" instead of \
         a SQL query.\n\n\
         Write only the SQL query and nothing else. Do not wrap the SQL query in any \
         other text, not even backticks.\n\n\
         For example:\n\
         Question: which 3 artists have the most tracks?\n\
         SQL Query: SELECT ArtistId, COUNT(*) as track_count FROM Track GROUP BY ArtistId \
         ORDER BY track_count DESC LIMIT 3;\n\
         Question: Name 10 artists\n\
         SQL Query: SELECT Name FROM Artist LIMIT 10;\n\
         Question: What is React.js?\n\
         SQL Query: {sentinel}\n\n\
         Your turn:\n\n\
         Question: {question}\n\
         SQL Query:",
        schema = schema,
        history = render_history(history),
        sentinel = SQL_SENTINEL,
        question = question,
    )
}

pub fn answer_prompt(
    schema: &str,
    history: &[ChatMessage],
    question: &str,
    query: &str,
    response: &str,
) -> String {
    format!(
        "You are a data analyst at a company. You are interacting with a user who is \
         asking you questions about the company's database.\n\
         Based on the table schema below, question, sql query, and sql response, write a \
         natural language response.\n\
         <SCHEMA>{schema}</SCHEMA>\n\n\
         Conversation History: {history}\n\
         SQL Query: <SQL>{query}</SQL>\n\
         User question: {question}\n\
         SQL Response: {response}\n\n\
         If the SQL Response indicates that the question cannot be answered using the \
         database, politely explain that you can only answer questions about the data in \
         the database and suggest asking questions about the data available in the schema.",
        schema = schema,
        history = render_history(history),
        query = query,
        question = question,
        response = response,
    )
}
