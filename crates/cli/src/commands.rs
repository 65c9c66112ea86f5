//! Command implementations over the core engine.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use tracing::{info, warn};

use trawler_core::categories::StandardCategory;
use trawler_core::http::ReqwestHttpClient;
use trawler_core::{
    load_config, load_dir, load_file, validate_config, Definition, DownloadPayload, EngineConfig,
    HttpClient, IndexerError, MultiIndexer, QueryKind, SearchQuery, SiteIndexer,
};

/// Effective configuration shared by every command.
#[derive(Debug)]
pub struct Context {
    config: EngineConfig,
    definitions_dir: PathBuf,
}

impl Context {
    /// Resolve the config file and definitions dir. A missing config file is
    /// only an error when the operator pointed at one explicitly; otherwise
    /// the defaults apply, so `trawler check defs/` works without any setup.
    pub fn prepare(config_path: Option<PathBuf>, definitions: Option<PathBuf>) -> Result<Self> {
        let explicit = config_path.is_some() || std::env::var_os("TRAWLER_CONFIG").is_some();
        let path = config_path
            .or_else(|| std::env::var_os("TRAWLER_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config.toml"));

        let config = if path.exists() {
            let config = load_config(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            validate_config(&config).context("config validation failed")?;
            info!(path = %path.display(), "config loaded");
            config
        } else if explicit {
            bail!("config file {} does not exist", path.display());
        } else {
            EngineConfig::default()
        };

        let definitions_dir = definitions.unwrap_or_else(|| config.definitions.dir.clone());
        Ok(Self {
            config,
            definitions_dir,
        })
    }

    fn http_client(&self) -> Result<Arc<dyn HttpClient>> {
        let http = &self.config.http;
        let client = ReqwestHttpClient::with_options(
            http.timeout(),
            &http.user_agent,
            http.max_redirects,
            http.proxy.as_deref(),
        )
        .context("failed to build HTTP client")?;
        Ok(Arc::new(client))
    }

    /// One indexer per loaded definition. Sites disabled in the config are
    /// skipped, configured sites get their settings, and the config's delay
    /// floor is applied.
    fn build_indexers(&self, only: &[String]) -> Result<Vec<Arc<SiteIndexer>>> {
        let http = self.http_client()?;
        let defs = load_dir(&self.definitions_dir).with_context(|| {
            format!(
                "failed to load definitions from {}",
                self.definitions_dir.display()
            )
        })?;

        let mut indexers = Vec::new();
        for mut def in defs {
            let entry = self.config.indexer(&def.id);
            if entry.is_some_and(|e| !e.enabled) {
                continue;
            }
            if !only.is_empty() && !only.iter().any(|id| id == &def.id) {
                continue;
            }
            apply_delay_floor(&mut def, self.config.rate_limit.min_delay_secs);
            let settings = entry.map(|e| e.to_settings()).unwrap_or_default();
            indexers.push(Arc::new(SiteIndexer::new(
                Arc::new(def),
                settings,
                Arc::clone(&http),
            )));
        }

        for id in only {
            if !indexers.iter().any(|i| i.id() == id) {
                bail!(
                    "no definition with id '{id}' in {}",
                    self.definitions_dir.display()
                );
            }
        }
        if indexers.is_empty() {
            bail!("no usable definitions in {}", self.definitions_dir.display());
        }
        Ok(indexers)
    }
}

/// A Definition asking for more than the config floor keeps its own delay.
fn apply_delay_floor(def: &mut Definition, floor: f64) {
    if floor > 0.0 && def.request_delay_secs.unwrap_or(0.0) < floor {
        def.request_delay_secs = Some(floor);
    }
}

/// Validate definition files one by one and report every failure, not just
/// the first.
pub fn check(ctx: &Context, paths: &[PathBuf]) -> Result<()> {
    let targets = if paths.is_empty() {
        vec![ctx.definitions_dir.clone()]
    } else {
        paths.to_vec()
    };

    let mut files = Vec::new();
    for target in &targets {
        if target.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(target)
                .with_context(|| format!("cannot read {}", target.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("toml") | Some("json")
                    )
                })
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(target.clone());
        }
    }
    if files.is_empty() {
        bail!("no definition files to check");
    }

    let mut failed = 0usize;
    for file in &files {
        match load_file(file) {
            Ok(def) => println!("ok   {} ({})", file.display(), def.id),
            Err(e) => {
                failed += 1;
                println!("FAIL {}: {e}", file.display());
            }
        }
    }
    println!("{} checked, {failed} failed", files.len());
    if failed > 0 {
        bail!("{failed} of {} definition files are invalid", files.len());
    }
    Ok(())
}

/// Print the capabilities of the loaded sites as JSON.
pub fn caps(ctx: &Context, indexer: Option<&str>) -> Result<()> {
    let only: Vec<String> = indexer.map(|id| vec![id.to_string()]).unwrap_or_default();
    let indexers = ctx.build_indexers(&only)?;
    let caps: Vec<_> = indexers.iter().map(|i| i.capabilities()).collect();
    println!("{}", serde_json::to_string_pretty(&caps)?);
    Ok(())
}

/// Assemble the query from the command line flags.
pub fn build_query(
    text: String,
    categories: Vec<String>,
    limit: Option<u32>,
    season: Option<u32>,
    episode: Option<u32>,
    year: Option<i32>,
    imdb: Option<String>,
) -> Result<SearchQuery> {
    let mut query = if season.is_some() {
        let mut q = SearchQuery::tv(text, season, episode);
        if let QueryKind::Tv { imdb_id, .. } = &mut q.kind {
            *imdb_id = imdb;
        }
        q
    } else if year.is_some() || imdb.is_some() {
        let mut q = SearchQuery::movie(text, year);
        if let QueryKind::Movie { imdb_id, .. } = &mut q.kind {
            *imdb_id = imdb;
        }
        q
    } else {
        SearchQuery::generic(text)
    };

    for raw in &categories {
        let cat = StandardCategory::from_name(raw)
            .with_context(|| format!("unknown category '{raw}'"))?;
        query.categories.push(cat);
    }
    query.limit = limit;
    Ok(query)
}

/// Search the selected sites and print one JSON release per line.
pub async fn search(ctx: &Context, query: &SearchQuery, only: &[String]) -> Result<()> {
    let multi = MultiIndexer::new(ctx.build_indexers(only)?);
    let mut outcome = multi.search(query).await;

    // Sites stuck on a captcha get one interactive round.
    let stalled: Vec<String> = outcome
        .errors
        .iter()
        .filter(|(_, e)| matches!(e, IndexerError::CaptchaRequired { .. }))
        .map(|(id, _)| id.clone())
        .collect();
    for id in stalled {
        let Some(indexer) = multi.get(&id) else {
            continue;
        };
        if let Err(e) = answer_captcha(indexer).await {
            warn!(indexer = %id, error = %e, "captcha skipped");
            continue;
        }
        match indexer.search(query).await {
            Ok(mut records) => {
                outcome.errors.remove(&id);
                outcome.releases.append(&mut records);
            }
            Err(e) => {
                outcome.errors.insert(id, e);
            }
        }
    }
    outcome
        .releases
        .sort_by(|a, b| b.seeders.unwrap_or(0).cmp(&a.seeders.unwrap_or(0)));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for release in &outcome.releases {
        serde_json::to_writer(&mut out, release)?;
        out.write_all(b"\n")?;
    }
    for (id, err) in &outcome.errors {
        warn!(indexer = %id, error = %err, "site failed");
    }
    info!(
        releases = outcome.releases.len(),
        failed = outcome.errors.len(),
        "search finished"
    );
    if outcome.all_failed() {
        bail!("every site failed");
    }
    Ok(())
}

/// Resolve one release link. Magnets go to stdout; torrent payloads are
/// written to disk and the path is printed.
pub async fn resolve(
    ctx: &Context,
    id: &str,
    link: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let Some(indexer) = ctx
        .build_indexers(&[id.to_string()])?
        .into_iter()
        .next()
    else {
        bail!("no definition with id '{id}'");
    };

    let payload = match indexer.download(link).await {
        Err(IndexerError::CaptchaRequired { .. }) => {
            answer_captcha(&indexer).await?;
            indexer.download(link).await?
        }
        other => other?,
    };

    match payload {
        DownloadPayload::Magnet(magnet) => println!("{magnet}"),
        DownloadPayload::Torrent(bytes) => {
            let path = output.unwrap_or_else(|| PathBuf::from(format!("{id}.torrent")));
            std::fs::write(&path, &bytes)
                .with_context(|| format!("cannot write {}", path.display()))?;
            let infohash = trawler_core::download::validate_torrent(&bytes)
                .unwrap_or_else(|_| "unknown".to_string());
            info!(path = %path.display(), bytes = bytes.len(), %infohash, "torrent written");
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Write the challenge image to a temp file and read the answer from stdin.
async fn answer_captcha(indexer: &SiteIndexer) -> Result<()> {
    let Some(challenge) = indexer.pending_captcha().await else {
        bail!("captcha reported but no challenge is pending");
    };
    let ext = match challenge.content_type.as_deref() {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("image/gif") => "gif",
        _ => "bin",
    };
    let path = std::env::temp_dir().join(format!("trawler-captcha-{}.{ext}", indexer.id()));
    std::fs::write(&path, &challenge.image)
        .with_context(|| format!("cannot write {}", path.display()))?;
    eprintln!(
        "captcha for '{}' written to {}",
        indexer.id(),
        path.display()
    );
    eprint!("captcha answer (empty to skip): ");
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("reading captcha answer")?;
    let answer = answer.trim();
    if answer.is_empty() {
        bail!("no answer given");
    }
    indexer.supply_captcha_answer(answer).await;
    Ok(())
}
