//! Two-stage pipeline: question to SQL, then SQL result to prose.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::gateway::DatabaseGateway;
use crate::model::{TextModel, TokenStream};
use crate::prompts::{self, SQL_SENTINEL};
use crate::session::ChatMessage;

/// Fixed response fed to the answer stage when the query stage signals
/// that the question is out of scope for the connected database.
pub const OUT_OF_SCOPE_RESPONSE: &str = "This question cannot be answered using the \
    database. Please ask questions about the data in the database.";

pub struct ChatChain {
    model: Arc<dyn TextModel>,
}

impl ChatChain {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Query stage: ask the model for a single SQL statement or the
    /// sentinel. The model call is deliberately unguarded; a failure here
    /// aborts the exchange, unlike execution failures which are absorbed.
    async fn generate_query(
        &self,
        gateway: &dyn DatabaseGateway,
        history: &[ChatMessage],
        question: &str,
    ) -> Result<String> {
        let schema = gateway.schema().await?;
        let prompt = prompts::sql_prompt(&schema, history, question);
        let query = self.model.complete(prompt).await?;

        Ok(query.trim().to_string())
    }

    /// Run the full pipeline and stream the natural-language answer.
    ///
    /// The schema is fetched once per stage rather than cached across
    /// them, so an exchange always sees the live table layout.
    pub async fn answer(
        &self,
        gateway: &dyn DatabaseGateway,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<TokenStream> {
        let query = self.generate_query(gateway, history, question).await?;
        debug!(%query, "generated query");

        let response = if query == SQL_SENTINEL {
            OUT_OF_SCOPE_RESPONSE.to_string()
        } else {
            match gateway.execute(&query).await {
                Ok(rows) => rows,
                Err(e) => format!("Error executing query: {}", e),
            }
        };

        let schema = gateway.schema().await?;
        let prompt = prompts::answer_prompt(&schema, history, question, &query, &response);

        self.model.stream(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Model stub that replies with a fixed query-stage answer and
    /// records every prompt it receives.
    struct ScriptedModel {
        query_reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(query_reply: &str) -> Arc<Self> {
            Arc::new(Self {
                query_reply: query_reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn answer_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        async fn complete(&self, prompt: String) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt);
            Ok(self.query_reply.clone())
        }

        async fn stream(&self, prompt: String) -> Result<TokenStream> {
            self.prompts.lock().unwrap().push(prompt);
            let chunks = vec![Ok("There ".to_string()), Ok("are 3.".to_string())];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    struct FakeGateway {
        rows: Result<String, String>,
        executions: AtomicUsize,
        schema_fetches: AtomicUsize,
    }

    impl FakeGateway {
        fn returning(rows: &str) -> Self {
            Self {
                rows: Ok(rows.to_string()),
                executions: AtomicUsize::new(0),
                schema_fetches: AtomicUsize::new(0),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                rows: Err(message.to_string()),
                executions: AtomicUsize::new(0),
                schema_fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DatabaseGateway for FakeGateway {
        async fn schema(&self) -> Result<String, GatewayError> {
            self.schema_fetches.fetch_add(1, Ordering::SeqCst);
            Ok("Table: Artist, Columns: [\"ArtistId int\", \"Name varchar\"]".to_string())
        }

        async fn execute(&self, _sql: &str) -> Result<String, GatewayError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            match &self.rows {
                Ok(rows) => Ok(rows.clone()),
                Err(message) => Err(GatewayError::Execution(sqlx::Error::Protocol(
                    message.clone(),
                ))),
            }
        }
    }

    async fn drain(mut stream: TokenStream) -> String {
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.unwrap());
        }
        text
    }

    #[tokio::test]
    async fn sentinel_short_circuits_execution() {
        let model = ScriptedModel::new(SQL_SENTINEL);
        let gateway = FakeGateway::returning("{ Name: Queen }");
        let chain = ChatChain::new(model.clone());

        let stream = chain
            .answer(&gateway, "what is React.js?", &[])
            .await
            .unwrap();
        drain(stream).await;

        assert_eq!(gateway.executions.load(Ordering::SeqCst), 0);
        assert!(model
            .answer_prompt()
            .contains(&format!("SQL Response: {}", OUT_OF_SCOPE_RESPONSE)));
    }

    #[tokio::test]
    async fn sentinel_is_matched_after_trimming() {
        let model = ScriptedModel::new(&format!("  {}\n", SQL_SENTINEL));
        let gateway = FakeGateway::returning("{ Name: Queen }");
        let chain = ChatChain::new(model);

        let stream = chain.answer(&gateway, "what is React.js?", &[]).await.unwrap();
        drain(stream).await;

        assert_eq!(gateway.executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn execution_error_is_absorbed_into_the_response() {
        let model = ScriptedModel::new("SELECT * FROM NoSuchTable;");
        let gateway = FakeGateway::failing("table 'NoSuchTable' does not exist");
        let chain = ChatChain::new(model.clone());

        let stream = chain
            .answer(&gateway, "list the missing things", &[])
            .await
            .unwrap();
        drain(stream).await;

        let expected = format!(
            "Error executing query: {}",
            GatewayError::Execution(sqlx::Error::Protocol(
                "table 'NoSuchTable' does not exist".to_string()
            ))
        );
        assert!(model.answer_prompt().contains(&format!("SQL Response: {}", expected)));
    }

    #[tokio::test]
    async fn query_result_reaches_answer_stage_verbatim() {
        let model = ScriptedModel::new("SELECT COUNT(*) FROM Artist;");
        let gateway = FakeGateway::returning("{ COUNT(*): 3 }");
        let chain = ChatChain::new(model.clone());

        let stream = chain
            .answer(&gateway, "how many artists are there?", &[])
            .await
            .unwrap();
        let answer = drain(stream).await;

        assert_eq!(gateway.executions.load(Ordering::SeqCst), 1);
        // One fetch per stage; the schema is never cached across them.
        assert_eq!(gateway.schema_fetches.load(Ordering::SeqCst), 2);
        assert_eq!(answer, "There are 3.");

        let prompt = model.answer_prompt();
        assert!(prompt.contains("SQL Response: { COUNT(*): 3 }"));
        assert!(prompt.contains("<SQL>SELECT COUNT(*) FROM Artist;</SQL>"));
    }

    #[tokio::test]
    async fn history_is_rendered_into_both_prompts() {
        let model = ScriptedModel::new("SELECT Name FROM Artist LIMIT 10;");
        let gateway = FakeGateway::returning("{ Name: Queen }");
        let chain = ChatChain::new(model.clone());

        let history = vec![
            ChatMessage::Assistant("Hello!".to_string()),
            ChatMessage::User("name ten artists".to_string()),
        ];
        let stream = chain
            .answer(&gateway, "name ten artists", &history)
            .await
            .unwrap();
        drain(stream).await;

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        for prompt in prompts.iter() {
            assert!(prompt.contains("Assistant: Hello!"));
            assert!(prompt.contains("User: name ten artists"));
        }
    }
}
