//! Answer generation boundary.
//!
//! A [`Generator`] turns a fully formatted prompt into an answer, either
//! at once or as a [`FragmentStream`]: a finite, ordered, non-restartable
//! sequence of text fragments whose concatenation is the full answer.

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};

/// Ordered answer fragments. The stream ends after the last fragment or
/// after the first error.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String> {
        let stream = self.generate_stream(prompt).await?;
        collect_fragments(stream).await
    }

    /// Incremental answer for `prompt`.
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream>;
}

/// Concatenate fragments in emission order, stopping at the first error.
pub async fn collect_fragments(mut stream: FragmentStream) -> Result<String> {
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        answer.push_str(&fragment?);
    }
    Ok(answer)
}

/// A stream over already-known fragments.
pub fn fragments_from<I>(fragments: I) -> FragmentStream
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
{
    Box::pin(futures::stream::iter(fragments.into_iter().map(Ok)))
}
