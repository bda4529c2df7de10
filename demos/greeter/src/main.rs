//! # Greeter Example
//!
//! A tiny conversational agent built from Ripple modules. People arrive
//! and leave through receptors, text comes in through `rawio:input`, and
//! competing states race to write `rawio:out`.
//!
//! Run with `RUST_LOG=ripple_core=debug` to watch arbitration, and point
//! `RIPPLE_CONFIG` at a TOML file to override the context settings.

use anyhow::Result;
use ripple_core::{
    async_trait, s, Action, ActionContext, Context, ContextConfig, Module, Outcome, Property,
    State,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Raw I/O
// ============================================================================

fn rawio() -> Module {
    Module::new("rawio")
        .property(Property::new("rawio", "in").default_value(""))
        .property(Property::new("rawio", "out").default_value(""))
        .state(
            State::builder("input")
                .receptor()
                .write("rawio:in")
                .action(|ctx: ActionContext| async move {
                    let text = ctx.arg(0).cloned().unwrap_or(Value::Null);
                    ctx.set("rawio:in", text)?;
                    Outcome::done()
                }),
        )
        .state(
            State::builder("print")
                .read("rawio:out")
                .action(|ctx: ActionContext| async move {
                    if let Some(text) = ctx.get("rawio:out")?.as_str() {
                        println!("bot> {text}");
                    }
                    Outcome::done()
                }),
        )
}

// ============================================================================
// Interlocutors
// ============================================================================

fn interloc() -> Module {
    let all = Property::new("interloc", "all");
    Module::new("interloc")
        .property(all.clone())
        .state(
            State::builder("arrive")
                .receptor()
                .write(&all)
                .action(|ctx: ActionContext| async move {
                    let name = ctx.arg(0).and_then(Value::as_str).unwrap_or("anon").to_string();
                    ctx.push("interloc:all", &name, json!({ "name": name }))?;
                    Outcome::done()
                }),
        )
        .state(
            State::builder("leave")
                .receptor()
                .write(&all)
                .action(|ctx: ActionContext| async move {
                    let name = ctx.arg(0).and_then(Value::as_str).unwrap_or("anon");
                    if !ctx.pop(&format!("interloc:all:{name}"))? {
                        info!(%name, "nobody by that name is here");
                    }
                    Outcome::done()
                }),
        )
}

// ============================================================================
// Language
// ============================================================================

/// Splits input into lowercase tokens and emits `nlp:is-question` when the
/// input ends with a question mark.
struct Tokenizer;

#[async_trait]
impl Action for Tokenizer {
    async fn run(&self, ctx: ActionContext) -> Result<Outcome> {
        let input = ctx.get("rawio:in")?;
        let text = input.as_str().unwrap_or_default().trim();
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        ctx.set("nlp:tokens", json!(tokens))?;

        if text.ends_with('?') {
            Ok(Outcome::Emit)
        } else {
            Ok(Outcome::Nothing)
        }
    }
}

fn nlp() -> Module {
    Module::new("nlp")
        .depends_on("rawio")
        .property(Property::new("nlp", "tokens").default_value(json!([])))
        .state(
            State::builder("parse")
                .read("rawio:in")
                .write("nlp:tokens")
                .signal("is-question")
                .handler(Tokenizer),
        )
}

// ============================================================================
// Dialog
// ============================================================================

fn chat() -> Module {
    let all = Property::new("interloc", "all");
    Module::new("chat")
        .depends_on("rawio")
        .depends_on("interloc")
        .depends_on("nlp")
        .state(
            State::builder("echo")
                .read("nlp:tokens")
                .write("rawio:out")
                .action(|ctx: ActionContext| async move {
                    let tokens = ctx.get("nlp:tokens")?;
                    let words: Vec<&str> = tokens
                        .as_array()
                        .map(|a| a.iter().filter_map(Value::as_str).collect())
                        .unwrap_or_default();
                    ctx.set("rawio:out", format!("You said: {}", words.join(" ")))?;
                    Outcome::done()
                }),
        )
        // Two bound signals outrank echo's one.
        .state(
            State::builder("answer")
                .read("nlp:tokens")
                .write("rawio:out")
                .cond(s("nlp:tokens:changed") & s("nlp:is-question"))
                .action(|ctx: ActionContext| async move {
                    ctx.set("rawio:out", "Good question. I have no idea.")?;
                    Outcome::done()
                }),
        )
        .state(
            State::builder("greeting")
                .read(&all)
                .write("rawio:out")
                .cond(all.pushed())
                .action(|ctx: ActionContext| async move {
                    let here = ctx.children("interloc:all")?;
                    let greeting = match here.len() {
                        1 => "Hello! Nice to meet you.".to_string(),
                        n => format!("Hello! There are {n} of you now."),
                    };
                    ctx.set("rawio:out", greeting)?;
                    Outcome::done()
                }),
        )
        // Says goodbye once, then retires.
        .state(
            State::builder("farewell")
                .read(&all)
                .write("rawio:out")
                .cond(all.popped())
                .action(|ctx: ActionContext| async move {
                    ctx.set("rawio:out", "Goodbye!")?;
                    Outcome::delete()
                }),
        )
}

// ============================================================================
// Main
// ============================================================================

enum Step {
    Arrive(&'static str),
    Say(&'static str),
    Leave(&'static str),
}

fn load_config() -> Result<ContextConfig> {
    match std::env::var_os("RIPPLE_CONFIG") {
        Some(path) => Ok(ContextConfig::from_file(&PathBuf::from(path))?),
        None => Ok(ContextConfig::default()),
    }
}

// Single-threaded so an action's writes and its outcome land in the same round.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut ctx = Context::new(load_config()?)?;
    ctx.add_module(rawio())?;
    ctx.add_module(interloc())?;
    ctx.add_module(nlp())?;
    ctx.add_module(chat())?;

    let script = [
        Step::Arrive("ada"),
        Step::Say("hi there"),
        Step::Say("how are you?"),
        Step::Arrive("grace"),
        Step::Leave("ada"),
        Step::Say("still here"),
        Step::Leave("grace"),
    ];

    for step in script {
        match step {
            Step::Arrive(name) => {
                println!("*** {name} arrives");
                ctx.invoke_receptor("interloc:arrive", vec![json!(name)])?;
            }
            Step::Say(text) => {
                println!("you> {text}");
                ctx.invoke_receptor("rawio:input", vec![json!(text)])?;
            }
            Step::Leave(name) => {
                println!("*** {name} leaves");
                ctx.invoke_receptor("interloc:leave", vec![json!(name)])?;
            }
        }
        ctx.settle().await?;
    }

    info!(
        rounds = ctx.round(),
        firings = ctx.history().len(),
        "conversation over"
    );
    Ok(())
}
