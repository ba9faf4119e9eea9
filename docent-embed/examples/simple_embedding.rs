//! Embed a few passages and a query with the local multilingual E5 model and rank them

use docent_embed::{EmbedRole, EmbeddingProvider, FastEmbedProvider, LocalEmbedConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = LocalEmbedConfig::multilingual_e5("multilingual-e5-small", "models")
        .with_batch_size(2);

    println!("Loading {} (cache: {})", config.model_name, config.cache_dir.display());
    let provider = FastEmbedProvider::create(config).await?;
    println!(
        "Provider {} ready, dimension {}",
        provider.provider_name(),
        provider.embedding_dimension()
    );

    let passages = vec![
        "Rust is a systems programming language.".to_string(),
        "Der Eiffelturm steht in Paris.".to_string(),
    ];
    let result = provider.embed_texts(&passages, EmbedRole::Passage).await?;

    let query = provider
        .embed_text("Where is the Eiffel Tower?", EmbedRole::Query)
        .await?;

    for (text, embedding) in passages.iter().zip(result.embeddings.iter()) {
        let score: f32 = embedding.iter().zip(&query).map(|(a, b)| a * b).sum();
        println!("{score:.3}  {text}");
    }

    Ok(())
}
