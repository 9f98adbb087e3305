//! Query surface: `rag ask`, `rag search`, and `rag chat`.
//!
//! [`AppContext::build`] opens the collection first, so a missing or
//! mismatched collection fails before any model is loaded or any network
//! call is made. The embedder, reranker, and generator are then built
//! once and reused for every question.

use anyhow::Result;
use futures::StreamExt;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

use notes_rag_core::generate::{collect_fragments, Generator};
use notes_rag_core::models::ScoredResult;
use notes_rag_core::retrieve::Retriever;
use notes_rag_core::store::VectorIndex;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::generate::create_generator;
use crate::migrate;
use crate::prompt::{build_prompt, format_context};
use crate::rerank::create_reranker;
use crate::sqlite_index::SqliteIndex;

pub const NO_RESULTS: &str = "No relevant information found for your query.";

const SNIPPET_CHARS: usize = 240;

const DIVIDER: &str = "----------------------------------------";

/// Long-lived collaborators for answering questions.
pub struct AppContext {
    pub retriever: Retriever,
    generator: Option<Arc<dyn Generator>>,
    template: String,
}

impl AppContext {
    /// Open the collection, then build the providers.
    ///
    /// `with_generator = false` skips the generation provider (retrieval only).
    pub async fn build(config: &Config, with_generator: bool) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        let index = SqliteIndex::open(
            pool,
            &config.collection.name,
            config.collection.distance,
        )
        .await?;
        let records = index.count().await?;
        info!(collection = %index.collection().name, records, "collection ready");

        let params = config.retrieval.params()?;
        let embedder = create_embedder(&config.embedding).await?;
        let stored_model = &index.collection().embedding_model;
        if !stored_model.is_empty() && stored_model != embedder.model_name() {
            warn!(
                stored = %stored_model,
                configured = embedder.model_name(),
                "collection was embedded with a different model"
            );
        }
        let reranker = create_reranker(&config.reranker).await?;
        let generator = if with_generator {
            Some(create_generator(&config.generation)?)
        } else {
            None
        };

        let retriever = Retriever::new(embedder, Arc::new(index), reranker, params)?;
        Ok(Self {
            retriever,
            generator,
            template: config.generation.template().to_string(),
        })
    }

    /// Retrieve with `top_n`, or the configured default.
    pub async fn search(&self, query: &str, top_n: Option<usize>) -> Result<Vec<ScoredResult>> {
        let top_n = top_n.unwrap_or(self.retriever.params().top_n);
        Ok(self.retriever.retrieve_and_rerank(query, top_n).await?)
    }

    fn generator(&self) -> Result<&dyn Generator> {
        self.generator
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("generation provider not initialized"))
    }

    /// Answer `question` and write it to `out`.
    ///
    /// Returns the retrieved results, or an empty list (after writing
    /// [`NO_RESULTS`]) when nothing was retrieved. The generator is not
    /// called in that case.
    pub async fn answer_to<W: Write>(
        &self,
        question: &str,
        top_n: Option<usize>,
        stream: bool,
        out: &mut W,
    ) -> Result<Vec<ScoredResult>> {
        let results = self.search(question, top_n).await?;
        if results.is_empty() {
            writeln!(out, "{}", NO_RESULTS)?;
            return Ok(results);
        }
        self.write_answer(question, &results, stream, out).await?;
        Ok(results)
    }

    /// One `rag chat` exchange: the `Answer:` block when something was
    /// retrieved, otherwise only [`NO_RESULTS`].
    ///
    /// The closing divider is written even when generation fails midway.
    pub async fn chat_turn<W: Write>(&self, question: &str, out: &mut W) -> Result<()> {
        let results = self.search(question, None).await?;
        if results.is_empty() {
            writeln!(out, "{}", NO_RESULTS)?;
            return Ok(());
        }

        writeln!(out, "\nAnswer:\n{}", DIVIDER)?;
        let outcome = self.write_answer(question, &results, true, out).await;
        writeln!(out, "{}", DIVIDER)?;
        outcome
    }

    async fn write_answer<W: Write>(
        &self,
        question: &str,
        results: &[ScoredResult],
        stream: bool,
        out: &mut W,
    ) -> Result<()> {
        let prompt = build_prompt(&self.template, &format_context(results), question);
        let generator = self.generator()?;
        if stream {
            let mut fragments = generator.generate_stream(&prompt).await?;
            while let Some(fragment) = fragments.next().await {
                write!(out, "{}", fragment?)?;
                out.flush()?;
            }
            writeln!(out)?;
        } else {
            let answer = collect_fragments(generator.generate_stream(&prompt).await?).await?;
            writeln!(out, "{}", answer)?;
        }
        Ok(())
    }

    /// Answer `question` without writing anything.
    pub async fn answer(&self, question: &str, top_n: Option<usize>) -> Result<AskOutput> {
        let sources = self.search(question, top_n).await?;
        let answer = if sources.is_empty() {
            None
        } else {
            let prompt = build_prompt(&self.template, &format_context(&sources), question);
            Some(self.generator()?.generate(&prompt).await?)
        };
        Ok(AskOutput {
            question: question.to_string(),
            answer,
            sources,
        })
    }
}

/// `rag ask --json` output.
#[derive(Debug, Serialize)]
pub struct AskOutput {
    pub question: String,
    /// `None` when nothing relevant was retrieved.
    pub answer: Option<String>,
    pub sources: Vec<ScoredResult>,
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    top_n: Option<usize>,
    stream: bool,
    json: bool,
) -> Result<()> {
    let ctx = AppContext::build(config, true).await?;
    if json {
        let output = ctx.answer(question, top_n).await?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    let mut stdout = std::io::stdout().lock();
    ctx.answer_to(question, top_n, stream, &mut stdout).await?;
    Ok(())
}

pub async fn run_search(
    config: &Config,
    query: &str,
    top_n: Option<usize>,
    json: bool,
) -> Result<()> {
    let ctx = AppContext::build(config, false).await?;
    let results = ctx.search(query, top_n).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("{}", NO_RESULTS);
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] similarity {:.3} (stage 1 rank {})",
            i + 1,
            result.score,
            result.similarity,
            result.stage1_rank + 1
        );
        println!("    excerpt: \"{}\"", snippet(&result.content));
        println!();
    }
    Ok(())
}

/// Interactive loop over stdin.
pub async fn run_chat(config: &Config) -> Result<()> {
    println!("{}", "=".repeat(60));
    println!("NOTES RAG");
    println!("{}", "=".repeat(60));
    println!("Initializing system...");
    let ctx = AppContext::build(config, true).await?;
    println!("System ready!");
    println!("Ask me anything about your notes! (type 'quit', 'exit', or 'q' to exit)");
    println!("{}", "=".repeat(60));

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\nYour question: ");
        std::io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => {
                println!();
                break;
            }
        };
        let question = line.trim();
        if is_exit_command(question) {
            println!("Goodbye!");
            break;
        }
        if question.is_empty() {
            continue;
        }

        println!("Searching for relevant information...");
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = ctx.chat_turn(question, &mut stdout).await {
            writeln!(stdout, "Error: {:#}", e)?;
        }
    }
    Ok(())
}

fn is_exit_command(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "quit" | "exit" | "q")
}

fn snippet(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat.to_string(),
    }
}
