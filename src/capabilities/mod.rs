//! Built-in capability set.
//!
//! [`builtin_registry`] composes every capability the pipelines use,
//! wired to one shared HTTP client and object-store handle. Pipelines
//! accept any [`CapabilityRegistry`], so tests swap individual entries
//! for doubles registered under the same names.

use std::sync::Arc;

use crate::config::PodweaveConfig;
use crate::registry::CapabilityRegistry;

pub mod article;
pub mod audio;
pub mod files;
pub mod llm;
pub mod rss;
pub mod search;
pub mod store;
pub mod transform;
pub mod tts;

pub use store::ObjectStoreClient;

/// Assemble the full production capability set.
pub fn builtin_registry(
    config: &PodweaveConfig,
    http: reqwest::Client,
    object_store: ObjectStoreClient,
) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();

    registry.register(
        "llm.complete",
        Arc::new(llm::LlmComplete::new(http.clone(), config.llm.clone())),
    );
    registry.register(
        "web.search",
        Arc::new(search::WebSearch::new(http.clone(), config.search.clone())),
    );
    registry.register(
        "web.extract",
        Arc::new(search::WebExtract::new(http.clone(), config.search.clone())),
    );
    registry.register("rss.fetch", Arc::new(rss::RssFetch::new(http.clone())));
    registry.register(
        "article.extract",
        Arc::new(article::ArticleExtract::new(http.clone())),
    );
    registry.register(
        "tts.synthesize",
        Arc::new(tts::TtsSynthesize::new(http, config.tts.clone())),
    );
    registry.register("fs.write", Arc::new(files::FsWrite));

    registry.register(
        "audio.concat",
        Arc::new(audio::AudioConcat::new(config.audio.clone())),
    );
    registry.register(
        "audio.mix_bgm",
        Arc::new(audio::AudioMixBgm::new(config.audio.clone())),
    );
    registry.register(
        "audio.segment",
        Arc::new(audio::AudioSegment::new(config.audio.clone())),
    );

    registry.register(
        "store.upload_dir",
        Arc::new(store::StoreUploadDir::new(object_store.clone())),
    );
    registry.register(
        "store.fetch_asset",
        Arc::new(store::StoreFetchAsset::new(object_store)),
    );

    register_transforms(&mut registry, config);
    registry
}

/// The closed set of named shaping capabilities.
pub fn register_transforms(registry: &mut CapabilityRegistry, config: &PodweaveConfig) {
    registry.register("transform.collect_urls", Arc::new(transform::CollectUrls));
    registry.register("transform.digest", Arc::new(transform::DigestResults));
    registry.register("transform.pick", Arc::new(transform::Pick));
    registry.register("transform.append_context", Arc::new(transform::AppendContext));
    registry.register("transform.is_non_empty", Arc::new(transform::IsNonEmpty));
    registry.register("transform.parse_json", Arc::new(transform::ParseJson));
    registry.register("transform.item_links", Arc::new(transform::ItemLinks));
    registry.register(
        "transform.select_feed",
        Arc::new(transform::SelectFeed::new(config.feeds.clone())),
    );
    registry.register("transform.resolve_voice", Arc::new(transform::ResolveVoice));
    registry.register("transform.line_path", Arc::new(transform::LinePath));
    registry.register("transform.pluck", Arc::new(transform::Pluck));
}
