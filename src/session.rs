//! Interactive chat session: transcript, connection settings, input loop.

use std::io::{stdin, stdout, Write};

use anyhow::Result;
use futures::StreamExt;

use crate::chain::ChatChain;
use crate::gateway::{ConnectionParameters, DatabaseGateway, MySqlGateway};
use crate::model::TokenStream;

pub const GREETING: &str = "Hello! I'm the Mosaic Chatbot. How can I help you today?";

/// One transcript entry, tagged by who said it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    User(String),
    Assistant(String),
}

/// Per-session state. The transcript is append-only and lives only as
/// long as the session; nothing here touches disk.
pub struct ChatSession {
    transcript: Vec<ChatMessage>,
    params: ConnectionParameters,
    gateway: Option<Box<dyn DatabaseGateway>>,
    chain: ChatChain,
}

impl ChatSession {
    pub fn new(params: ConnectionParameters, chain: ChatChain) -> Self {
        Self {
            transcript: vec![ChatMessage::Assistant(GREETING.to_string())],
            params,
            gateway: None,
            chain,
        }
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    pub fn gateway(&self) -> Option<&dyn DatabaseGateway> {
        self.gateway.as_deref()
    }

    pub fn attach_gateway(&mut self, gateway: Box<dyn DatabaseGateway>) {
        self.gateway = Some(gateway);
    }

    /// Update one connection field by name. Returns false for an unknown
    /// field name.
    pub fn set_parameter(&mut self, field: &str, value: &str) -> bool {
        match field {
            "host" => self.params.host = value.to_string(),
            "port" => self.params.port = value.to_string(),
            "database" => self.params.database = value.to_string(),
            "user" => self.params.user = value.to_string(),
            "password" => self.params.password = value.to_string(),
            _ => return false,
        }
        true
    }

    /// Append the question and, if a gateway is connected, start an
    /// answer stream. `None` means the connection guard rejected the
    /// question and no generation ran.
    pub async fn ask(&mut self, question: &str) -> Result<Option<TokenStream>> {
        self.transcript.push(ChatMessage::User(question.to_string()));

        let Some(gateway) = &self.gateway else {
            return Ok(None);
        };

        let stream = self
            .chain
            .answer(gateway.as_ref(), question, &self.transcript)
            .await?;

        Ok(Some(stream))
    }

    pub fn record_answer(&mut self, text: String) {
        self.transcript.push(ChatMessage::Assistant(text));
    }
}

/// Run the chat loop on stdin/stdout until `/quit` or end of input.
pub async fn run(mut session: ChatSession) -> Result<()> {
    println!("Mosaic Chatbot");
    println!("Ask questions about the connected database. Type /help for commands.");
    println!();

    for message in session.transcript() {
        render_message(message);
    }

    let mut input = String::new();

    loop {
        print!("you: ");
        stdout().flush()?;

        input.clear();
        if stdin().read_line(&mut input)? == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(&mut session, command).await? {
                break;
            }
            continue;
        }

        match session.ask(line).await? {
            None => {
                println!("Please connect to a database first using /connect.");
            }
            Some(mut stream) => {
                print!("assistant: ");
                stdout().flush()?;

                let mut answer = String::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    print!("{}", chunk);
                    stdout().flush()?;
                    answer.push_str(&chunk);
                }
                println!();

                session.record_answer(answer);
            }
        }
    }

    Ok(())
}

/// Handle one slash command. Returns false when the session should end.
async fn handle_command(session: &mut ChatSession, command: &str) -> Result<bool> {
    let mut parts = command.splitn(3, ' ');

    match parts.next().unwrap_or("") {
        "help" => {
            println!("Commands:");
            println!("  /settings             show the connection settings");
            println!("  /set <field> <value>  set host, port, database, user or password");
            println!("  /connect              connect to the database");
            println!("  /schema               show the connected database's schema");
            println!("  /quit                 end the session");
        }
        "settings" => {
            let params = session.params();
            println!("Host:     {}", params.host);
            println!("Port:     {}", params.port);
            println!("Database: {}", params.database);
            println!("User:     {}", params.user);
            println!("Password: {}", "*".repeat(params.password.len()));
        }
        "set" => match (parts.next(), parts.next()) {
            (Some(field), Some(value)) => {
                if session.set_parameter(field, value) {
                    println!("{} updated.", field);
                } else {
                    println!("Unknown setting: {}. Fields: host, port, database, user, password.", field);
                }
            }
            _ => println!("Usage: /set <field> <value>"),
        },
        "connect" => {
            if session.params().password.is_empty() {
                println!("Please enter the database password (/set password <value>).");
            } else {
                println!("Connecting to database...");
                match MySqlGateway::connect(session.params()).await {
                    Ok(gateway) => {
                        session.attach_gateway(Box::new(gateway));
                        println!("Connected to database");
                    }
                    Err(e) => println!("Failed to connect to database: {}", e),
                }
            }
        }
        "schema" => match session.gateway() {
            Some(gateway) => println!("{}", gateway.schema().await?),
            None => println!("Please connect to a database first using /connect."),
        },
        "quit" | "exit" => return Ok(false),
        other => println!("Unknown command: /{}. Type /help for commands.", other),
    }

    Ok(true)
}

fn render_message(message: &ChatMessage) {
    match message {
        ChatMessage::User(text) => println!("you: {}", text),
        ChatMessage::Assistant(text) => println!("assistant: {}", text),
    }
}
