use clap::Parser;
use newsdex::{
    ArchiveDb,
    DataDir,
    Error,
    NewsIndex,
    Result,
    cli::{
        AnalyzeArgs,
        Cli,
        Command,
        GetArgs,
        HistoryArgs,
        IngestArgs,
        MatrixArgs,
        ReindexArgs,
        SearchArgs,
    },
    enrich::Enricher,
    geocode::{NominatimConfig, NominatimGeocoder},
    ingestion,
    matrix::{FrequencyMatrix, MatrixBuilder},
    news_index::{DocField, IndexConfig},
    progress::{BarProgress, NoProgress, Progress},
    search::{self, SearchParams},
    tagger::GazetteerTagger,
};
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "NEWSDEX_LOG";

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var(LOG_ENV_VAR) {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Where this run keeps its data.
struct Stores {
    index: IndexConfig,
    archive: ArchiveDb,
    data_dir: Option<DataDir>,
}

impl Stores {
    fn open(cli: &Cli) -> Result<Self> {
        if cli.ephemeral {
            return Ok(Self {
                index: IndexConfig::in_memory(),
                archive: ArchiveDb::in_memory()?,
                data_dir: None,
            });
        }

        let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
        Ok(Self {
            index: IndexConfig::directory(data_dir.index_dir()),
            archive: ArchiveDb::open(&data_dir.archive_db())?,
            data_dir: Some(data_dir),
        })
    }
}

fn progress(quiet: bool, desc: &str) -> Box<dyn Progress> {
    if quiet {
        Box::new(NoProgress)
    } else {
        Box::new(BarProgress::new(desc))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    let quiet = cli.quiet;

    match &cli.command {
        Command::Completions(args) => {
            args.generate();
            Ok(())
        }
        Command::History(args) => cmd_history(args, &Stores::open(&cli)?),
        Command::Reindex(args) => cmd_reindex(args, &cli),
        Command::Ingest(args) => with_index(&cli, |index, stores| {
            cmd_ingest(args, index, stores, quiet)
        }),
        Command::Search(args) => {
            with_index(&cli, |index, stores| cmd_search(args, index, stores))
        }
        Command::Matrix(args) => with_index(&cli, |index, stores| {
            cmd_matrix(args, index, stores, quiet)
        }),
        Command::Get(args) => with_index(&cli, |index, _| cmd_get(args, index)),
        Command::Analyze(args) => {
            with_index(&cli, |index, _| cmd_analyze(args, index, quiet))
        }
        Command::Status(args) => with_index(&cli, |index, stores| {
            cmd_status(args.json, index, stores)
        }),
    }
}

/// Open the stores and run `f` against a scoped index.
fn with_index<T>(
    cli: &Cli,
    f: impl FnOnce(&mut NewsIndex, &Stores) -> Result<T>,
) -> Result<T> {
    let stores = Stores::open(cli)?;
    let config = stores.index.clone().verbose(cli.verbose > 0);
    NewsIndex::scoped(config, |index| f(index, &stores))
}

fn cmd_ingest(
    args: &IngestArgs,
    index: &mut NewsIndex,
    stores: &Stores,
    quiet: bool,
) -> Result<()> {
    for source in &args.sources {
        let documents = ingestion::load_records(source)?;
        eprintln!(
            "Ingesting {} article(s) from {}",
            documents.len(),
            source.display()
        );

        let mut bar = progress(quiet, "Indexing");
        let report = ingestion::ingest_documents(
            &documents,
            index,
            &stores.archive,
            bar.as_mut(),
        )?;
        eprintln!(
            "  {} processed, {} new, {} updated",
            report.processed,
            report.added,
            report.processed - report.added
        );
    }
    Ok(())
}

fn cmd_reindex(args: &ReindexArgs, cli: &Cli) -> Result<()> {
    let stores = Stores::open(cli)?;
    if args.fresh {
        if let Some(dir) = &stores.data_dir {
            let index_dir = dir.index_dir();
            if index_dir.exists() {
                std::fs::remove_dir_all(&index_dir)?;
                eprintln!("Removed {}", index_dir.display());
            }
        }
    }

    let config = stores.index.clone().verbose(cli.verbose > 0);
    NewsIndex::scoped(config, |index| {
        let mut bar = progress(cli.quiet, "Reindexing");
        let report =
            ingestion::reindex(index, &stores.archive, bar.as_mut())?;
        eprintln!(
            "  {} processed, {} new, {} updated",
            report.processed,
            report.added,
            report.processed - report.added
        );
        Ok(())
    })
}

fn cmd_search(
    args: &SearchArgs,
    index: &NewsIndex,
    stores: &Stores,
) -> Result<()> {
    let params = SearchParams {
        query: args.query.clone(),
        count: if args.all { None } else { Some(args.count) },
        min_score: args.min_score,
        rule: args.rule,
    };
    let results = search::execute_search(&params, index, &stores.archive)?;

    if args.json {
        search::format_json(&results, &args.query)?;
    } else {
        search::format_human(&results);
    }
    Ok(())
}

fn cmd_matrix(
    args: &MatrixArgs,
    index: &NewsIndex,
    stores: &Stores,
    quiet: bool,
) -> Result<()> {
    let mut builder = MatrixBuilder::new(index).rule(args.rule);
    let export = args
        .output
        .clone()
        .or_else(|| stores.data_dir.as_ref().map(DataDir::matrix_export));
    if let Some(path) = &export {
        builder = builder.export_path(path);
    }

    let persist = !args.json;
    if persist && export.is_none() {
        return Err(Error::Config(
            "an ephemeral run needs --output to export the matrix".into(),
        ));
    }

    let mut bar = progress(quiet, "Scoring");
    let matrix =
        builder.build_with_progress(args.orientation, persist, bar.as_mut())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&matrix)?);
    } else if let Some(path) = export {
        let terms = match &matrix {
            FrequencyMatrix::ByTerm(m) => m.term_count(),
            FrequencyMatrix::ByDocument(m) => m.to_by_term().term_count(),
        };
        println!(
            "{terms} terms x {} documents -> {}",
            matrix.document_count(),
            path.display()
        );
    }
    Ok(())
}

/// Resolve an ordinal or a document name.
///
/// A number is an ordinal unless `by_name` is set or no document has that
/// ordinal, in which case it is looked up as a name.
fn resolve_reference(
    index: &NewsIndex,
    reference: &str,
    by_name: bool,
) -> Result<usize> {
    if !by_name {
        if let Ok(ordinal) = reference.parse::<usize>() {
            if ordinal < index.count() {
                return Ok(ordinal);
            }
        }
    }
    index.ordinal_of(reference).ok_or_else(|| Error::NotFound {
        kind: "document",
        name: reference.to_string(),
    })
}

fn cmd_get(args: &GetArgs, index: &NewsIndex) -> Result<()> {
    let ordinal = resolve_reference(index, &args.reference, args.name)?;

    if let Some(field) = args.field {
        println!("{}", index.field(ordinal, field)?);
        return Ok(());
    }

    let doc = index.document(ordinal)?;
    if args.json {
        let value = serde_json::json!({
            "ordinal": doc.ordinal,
            "name": doc.name,
            "url": doc.url,
            "date": doc.date,
            "timestamp": doc.timestamp,
            "tags": doc.tags,
            "content": doc.content,
        });
        println!("{value}");
    } else {
        println!("ordinal: {}", doc.ordinal);
        println!("name: {}", doc.name);
        println!("url: {}", doc.url);
        println!("date: {} ({})", doc.date, doc.timestamp);
        println!("tags: {}", doc.tags.join(", "));
        println!();
        println!("{}", doc.content);
    }
    Ok(())
}

fn cmd_analyze(
    args: &AnalyzeArgs,
    index: &NewsIndex,
    quiet: bool,
) -> Result<()> {
    let ordinal = resolve_reference(index, &args.reference, args.name)?;
    let tagger = GazetteerTagger::from_file(&args.gazetteer)?;

    let mut config = NominatimConfig {
        country_codes: args.countries.clone(),
        ..NominatimConfig::default()
    };
    if let Some(url) = &args.geocoder_url {
        config.url = url.clone();
    }
    if let Some(agent) = &args.user_agent {
        config.user_agent = agent.clone();
    }
    let enricher = Enricher::new(tagger, NominatimGeocoder::new(config)?);

    if let Some(label) = &args.entities {
        let content = index.field(ordinal, DocField::Content)?;
        for name in enricher.named_entities(&content, label) {
            println!("{name}");
        }
        return Ok(());
    }

    let mut bar = progress(quiet, "Tagging");
    let collection =
        enricher.analyze_with_progress(index, ordinal, bar.as_mut())?;
    println!("{}", serde_json::to_string_pretty(&collection)?);
    Ok(())
}

fn cmd_history(args: &HistoryArgs, stores: &Stores) -> Result<()> {
    if args.clear {
        let removed = stores.archive.clear_history()?;
        println!("Cleared {removed} search(es)");
        return Ok(());
    }

    let history = stores.archive.history(args.count)?;
    if args.json {
        println!("{}", serde_json::to_string(&history)?);
    } else if history.is_empty() {
        println!("No searches recorded.");
    } else {
        for entry in &history {
            println!(
                "{:>4}  {}  {:>3} result(s)  {}",
                entry.id, entry.at, entry.results, entry.query
            );
        }
    }
    Ok(())
}

fn cmd_status(json: bool, index: &NewsIndex, stores: &Stores) -> Result<()> {
    let documents = index.count();
    let archived = stores.archive.document_count()?;
    let searches = stores.archive.history(usize::MAX)?.len();
    let location = match index.location() {
        Some(path) => path.display().to_string(),
        None => "(in memory)".to_string(),
    };

    if json {
        let value = serde_json::json!({
            "index": location,
            "mode": format!("{:?}", index.mode()),
            "documents": documents,
            "archived": archived,
            "searches": searches,
        });
        println!("{value}");
    } else {
        if let Some(dir) = &stores.data_dir {
            println!("Data directory: {}", dir.root().display());
        }
        println!("Index: {location} ({:?})", index.mode());
        println!("Documents: {documents}");
        println!("Archived: {archived}");
        println!("Searches: {searches}");
    }
    Ok(())
}
