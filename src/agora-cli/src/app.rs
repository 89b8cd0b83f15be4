//! Interactive terminal loop.

use std::io::Write;

use agora_core::config::CatalogConfig;
use agora_core::{DebateError, DebateSettings, Message, Narrator, Sender, SessionMachine, Stance, View};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::render;

pub struct App {
    machine: SessionMachine,
    catalog: CatalogConfig,
    narrator: Option<Narrator>,
    lines: Lines<BufReader<Stdin>>,
}

impl App {
    pub fn new(machine: SessionMachine, catalog: CatalogConfig, narrator: Option<Narrator>) -> Self {
        Self {
            machine,
            catalog,
            narrator,
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    pub fn machine_mut(&mut self) -> &mut SessionMachine {
        &mut self.machine
    }

    /// Start a debate and wait for the opening statement.
    pub async fn begin_debate(&mut self, settings: DebateSettings) -> Result<(), DebateError> {
        let state = self.machine.start_debate(settings)?;
        render::print_debate_header(state);
        self.machine.opening_statement().await?;
        self.speak_last_reply();
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_current_view();

        loop {
            let Some(line) = self.prompt(self.prompt_label()).await? else {
                break;
            };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            let keep_going = match self.machine.view() {
                View::ActiveDebate => self.handle_debate_input(&line).await,
                View::History => self.handle_history_input(&line),
                View::Setup | View::Judging => self.handle_setup_input(&line).await?,
            };
            if !keep_going {
                break;
            }
        }

        if let Some(narrator) = self.narrator.as_mut() {
            narrator.stop();
        }
        println!();
        println!("{}", "Goodbye.".bright_blue());
        Ok(())
    }

    fn prompt_label(&self) -> &'static str {
        match self.machine.view() {
            View::ActiveDebate => "you",
            View::History => "history",
            View::Setup | View::Judging => "agora",
        }
    }

    async fn prompt(&mut self, label: &str) -> std::io::Result<Option<String>> {
        print!("{} ", format!("{}>", label).bright_cyan().bold());
        std::io::stdout().flush()?;
        self.lines.next_line().await
    }

    fn show_current_view(&self) {
        match self.machine.view() {
            View::ActiveDebate => {
                if let Some(state) = self.machine.active() {
                    render::print_debate_header(state);
                    render::print_transcript(&state.messages);
                }
            }
            View::History => {
                if let Some(record) = self.machine.selected_record() {
                    render::print_record(record);
                }
            }
            View::Setup | View::Judging => render::print_setup(&self.machine, &self.catalog),
        }
    }

    async fn handle_setup_input(&mut self, line: &str) -> std::io::Result<bool> {
        let (command, arg) = split_command(line);
        match command {
            "quit" | "exit" | "q" => return Ok(false),
            "new" => match self.ask_settings().await? {
                Some(settings) => {
                    if let Err(e) = self.begin_debate(settings).await {
                        print_error(&e);
                    }
                }
                None => println!("{}", "Cancelled.".dimmed()),
            },
            "view" => match parse_index(arg) {
                Some(index) => match self.machine.view_history(index) {
                    Ok(record) => render::print_record(record),
                    Err(e) => print_error(&e),
                },
                None => println!("{}", "Usage: view <n>".yellow()),
            },
            "resume" => match self.machine.resume_debate() {
                Ok(_) => self.show_current_view(),
                Err(e) => print_error(&e),
            },
            "login" => {
                println!("{}", "Opening your browser to sign in with Google...".dimmed());
                match self.machine.sign_in().await {
                    Ok(()) => render::print_setup(&self.machine, &self.catalog),
                    Err(e) => print_error(&e),
                }
            }
            "logout" => {
                self.machine.sign_out().await;
                println!("{}", "Signed out.".dimmed());
                render::print_setup(&self.machine, &self.catalog);
            }
            "help" | "?" => render::print_setup(&self.machine, &self.catalog),
            _ => println!("{} {}", "Unknown command:".yellow(), command),
        }
        Ok(true)
    }

    async fn handle_debate_input(&mut self, line: &str) -> bool {
        match line {
            "/end" => {
                self.stop_speech();
                match self.machine.end_debate().await {
                    Ok(None) => println!("{}", "Debate discarded; nothing was said yet.".dimmed()),
                    Ok(Some(_)) => {}
                    Err(e) => print_error(&e),
                }
                render::print_setup(&self.machine, &self.catalog);
            }
            "/replay" => self.speak_last_reply(),
            "/stop" => self.stop_speech(),
            "/menu" => {
                self.machine.back();
                render::print_setup(&self.machine, &self.catalog);
            }
            text => {
                self.stop_speech();
                match self.machine.send_message(text).await {
                    Ok(()) => self.speak_last_reply(),
                    Err(e) => print_error(&e),
                }
            }
        }
        // The debate screen never exits the program.
        true
    }

    fn handle_history_input(&mut self, line: &str) -> bool {
        let (command, arg) = split_command(line);
        match command {
            "back" => {
                self.stop_speech();
                self.machine.back();
                render::print_setup(&self.machine, &self.catalog);
            }
            "play" => {
                let message = parse_index(arg).and_then(|n| {
                    self.machine
                        .selected_record()
                        .and_then(|record| nth_ai_message(record.messages(), n).cloned())
                });
                match message {
                    Some(message) => self.speak(&message),
                    None => println!("{}", "Usage: play <n>, where n counts Agora's messages".yellow()),
                }
            }
            "quit" | "exit" | "q" => return false,
            _ => println!("{} play <n>, back", "Commands:".dimmed()),
        }
        true
    }

    /// Collect topic, stance and persona. `None` when the user cancels with an empty answer.
    async fn ask_settings(&mut self) -> std::io::Result<Option<DebateSettings>> {
        println!("{}", "Pick a topic by number or type your own.".dimmed());
        let Some(topic) = self.prompt("topic").await? else {
            return Ok(None);
        };
        let topic = pick_from(&self.catalog.suggested_topics, topic.trim());
        if topic.is_empty() {
            return Ok(None);
        }

        let stance = loop {
            let Some(answer) = self.prompt("stance (for/against)").await? else {
                return Ok(None);
            };
            if answer.trim().is_empty() {
                return Ok(None);
            }
            match Stance::parse(&answer) {
                Some(stance) => break stance,
                None => println!("{}", "Answer `for` or `against`.".yellow()),
            }
        };

        println!("{} {}", "Personas:".dimmed(), self.catalog.personas.join(", ").dimmed());
        let Some(persona) = self.prompt("persona").await? else {
            return Ok(None);
        };
        let persona = pick_from(&self.catalog.personas, persona.trim());
        let persona = if persona.is_empty() {
            self.catalog.personas.first().cloned().unwrap_or_else(|| "Skeptic".to_string())
        } else {
            persona
        };

        Ok(Some(DebateSettings::new(topic, stance, persona)))
    }

    fn speak_last_reply(&mut self) {
        let message = self
            .machine
            .active()
            .and_then(|state| state.last_ai_message())
            .cloned();
        if let Some(message) = message {
            self.speak(&message);
        }
    }

    fn speak(&mut self, message: &Message) {
        if let Some(narrator) = self.narrator.as_mut() {
            // Progress arrives through the speech callback.
            drop(narrator.speak(&message.id, &message.text));
        }
    }

    fn stop_speech(&mut self) {
        if let Some(narrator) = self.narrator.as_mut() {
            narrator.stop();
        }
    }
}

fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    }
}

/// Parse a 1-based index as typed by the user.
fn parse_index(arg: &str) -> Option<usize> {
    arg.parse::<usize>().ok().filter(|n| *n > 0).map(|n| n - 1)
}

/// A catalog entry chosen by 1-based number, or the answer itself.
fn pick_from(options: &[String], answer: &str) -> String {
    parse_index(answer)
        .and_then(|i| options.get(i).cloned())
        .unwrap_or_else(|| answer.to_string())
}

fn nth_ai_message(messages: &[Message], index: usize) -> Option<&Message> {
    messages.iter().filter(|m| m.sender == Sender::Ai).nth(index)
}

fn print_error(error: &DebateError) {
    println!("{} {}", "Error:".red().bold(), error);
}
