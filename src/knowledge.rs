//! Knowledge base assembly from configuration.
//!
//! Reads the knowledge file named by `[knowledge].path`, embeds every
//! passage with the configured provider, and wraps the result in a
//! [`SharedKnowledgeBase`] that the shells and the server share.
//!
//! A missing or unreadable knowledge file is fatal at startup. With
//! `[knowledge].enabled = false` no file is read and the corpus is empty,
//! so every answer takes the ungrounded path.

use anyhow::{Context, Result};
use std::sync::Arc;

use panchakarma_core::{Corpus, Embedder, KnowledgeBase, SharedKnowledgeBase};

use crate::config::Config;
use crate::embedding::create_embedder;

/// Load the corpus configured in `[knowledge]`.
pub fn load_corpus(config: &Config) -> Result<Corpus> {
    if !config.knowledge.enabled {
        tracing::info!("knowledge file disabled; answers will be ungrounded");
        return Ok(Corpus::empty());
    }

    let path = &config.knowledge.path;
    let corpus = Corpus::load(path)
        .with_context(|| format!("Failed to load knowledge file: {}", path.display()))?;
    tracing::info!(path = %path.display(), passages = corpus.len(), "loaded knowledge file");
    Ok(corpus)
}

/// Embed the configured corpus with `embedder`.
pub async fn build_knowledge_base(
    config: &Config,
    embedder: Arc<dyn Embedder>,
) -> Result<KnowledgeBase> {
    let corpus = load_corpus(config)?;
    KnowledgeBase::build(corpus, embedder)
        .await
        .context("Failed to embed knowledge passages")
}

/// Create the embedder and the live knowledge base in one step.
pub async fn open_knowledge_base(config: &Config) -> Result<SharedKnowledgeBase> {
    let embedder = create_embedder(&config.embedding).await?;
    let kb = build_knowledge_base(config, embedder).await?;
    Ok(SharedKnowledgeBase::new(kb))
}

/// Re-read the knowledge file and swap it into `shared`.
///
/// The embedder of the current snapshot is reused. On failure the previous
/// knowledge base stays live and the error is returned.
pub async fn reload(config: &Config, shared: &SharedKnowledgeBase) -> Result<usize> {
    let embedder = shared.snapshot().embedder();
    let kb = build_knowledge_base(config, embedder).await?;
    let passages = kb.len();
    shared.replace(kb);
    Ok(passages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use panchakarma_core::HashEmbedder;
    use std::path::Path;

    fn config_for(path: &Path) -> Config {
        let mut config = Config::default();
        config.knowledge.path = path.to_path_buf();
        config.embedding.provider = "hash".to_string();
        config
    }

    #[test]
    fn test_disabled_knowledge_is_empty() {
        let mut config = config_for(Path::new("/does/not/exist.txt"));
        config.knowledge.enabled = false;
        assert!(load_corpus(&config).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let config = config_for(Path::new("/does/not/exist.txt"));
        let err = load_corpus(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load knowledge file"));
    }

    #[tokio::test]
    async fn test_open_and_reload() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("kb.txt");
        std::fs::write(&path, "Virechana: eat light.\n\nBasti: rest afterwards.").unwrap();
        let config = config_for(&path);

        let shared = open_knowledge_base(&config).await.unwrap();
        assert_eq!(shared.snapshot().len(), 2);

        std::fs::write(&path, "One.\n\nTwo.\n\nThree.").unwrap();
        assert_eq!(reload(&config, &shared).await.unwrap(), 3);
        assert_eq!(shared.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("kb.txt");
        std::fs::write(&path, "Nasya: avoid dust.").unwrap();
        let config = config_for(&path);

        let kb = build_knowledge_base(&config, Arc::new(HashEmbedder::default()))
            .await
            .unwrap();
        let shared = SharedKnowledgeBase::new(kb);

        std::fs::remove_file(&path).unwrap();
        assert!(reload(&config, &shared).await.is_err());
        assert_eq!(shared.snapshot().len(), 1);
    }
}
