use clap::{Parser, Subcommand};
use csv::ReaderBuilder;
use prettytable::{Cell, Row, Table};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clockjoin::{
    Attribute, BUFFER_POOL_SIZE, BufferManager, Catalog, CatalogError, FileError, FileHandle,
    HeapFile, JoinAlgorithm, JoinError, JoinOperator, PagedFileManager, RecordError, RecordResult,
    TableScanner, TableSchema, Value, record::encode_tuple,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    File(#[from] FileError),

    #[error("{0}")]
    Record(#[from] RecordError),

    #[error("{0}")]
    Join(#[from] JoinError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "clockjoin", version, about = "Buffer-pool backed tables and joins")]
struct Cli {
    /// Directory holding the catalog and table files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Number of frames in the buffer pool
    #[arg(long, default_value_t = BUFFER_POOL_SIZE)]
    pool_pages: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a table from `name:TYPE[:not_null][:unique]` attribute specs
    CreateTable {
        name: String,
        #[arg(long = "attr", required = true)]
        attrs: Vec<Attribute>,
        /// Rows to load right away
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Append CSV rows (no header) to a table
    Load {
        #[arg(long)]
        table: String,
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Remove a table from the catalog and delete its file
    DropTable { name: String },
    /// List catalogued tables
    Tables,
    /// Print every row of a table
    Scan { table: String },
    /// Join two tables on their common attributes into a new table
    Join {
        #[arg(long)]
        left: String,
        #[arg(long)]
        right: String,
        /// Buffer pages the join may hold at once
        #[arg(long, default_value_t = 10)]
        pages: usize,
        /// Name of the result table (default: LEFT_RIGHT)
        #[arg(long)]
        into: Option<String>,
        #[arg(long, default_value = "nested-loop")]
        algorithm: JoinAlgorithm,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    fs::create_dir_all(&cli.data_dir)?;
    let mut catalog = Catalog::load(&cli.data_dir)?;
    let mut buffer_mgr = BufferManager::with_capacity(PagedFileManager::new(), cli.pool_pages);

    match cli.command {
        Command::CreateTable { name, attrs, csv } => {
            let path = table_path(&cli.data_dir, &name);
            let schema = TableSchema::new(name, attrs);
            schema.check_distinct_names()?;
            catalog.add_table(schema.clone(), path.to_string_lossy())?;

            let file = HeapFile::create(&mut buffer_mgr, &path)?;
            if let Some(csv) = csv {
                let rows = load_csv(&mut buffer_mgr, &schema, file, &csv, ',')?;
                println!("Loaded {} rows", rows);
            }
            catalog.save(&cli.data_dir)?;
            println!("Created table {}", schema.table_name());
        }
        Command::Load {
            table,
            csv,
            delimiter,
        } => {
            let schema = catalog.table_schema(&table)?.clone();
            let file = open_table(&catalog, &mut buffer_mgr, &table)?;
            let rows = load_csv(&mut buffer_mgr, &schema, file, &csv, delimiter)?;
            println!("Loaded {} rows into {}", rows, table);
        }
        Command::DropTable { name } => {
            let meta = catalog.remove_table(&name)?;
            let path = Path::new(&meta.filename);
            if path.exists() {
                buffer_mgr.file_manager_mut().remove_file(path)?;
            } else {
                warn!(table = %name, file = %meta.filename, "table file already gone");
            }
            catalog.save(&cli.data_dir)?;
            println!("Dropped table {}", name);
        }
        Command::Tables => {
            let mut table = Table::new();
            table.set_titles(Row::new(vec![
                Cell::new("id"),
                Cell::new("name"),
                Cell::new("attributes"),
                Cell::new("file"),
            ]));
            for meta in catalog.tables() {
                let attrs: Vec<String> = meta
                    .schema
                    .attributes()
                    .iter()
                    .map(|attr| format!("{} {}", attr.name, attr.data_type))
                    .collect();
                table.add_row(Row::new(vec![
                    Cell::new(&meta.id.to_string()),
                    Cell::new(meta.schema.table_name()),
                    Cell::new(&attrs.join(", ")),
                    Cell::new(&meta.filename),
                ]));
            }
            table.printstd();
        }
        Command::Scan { table } => {
            let schema = catalog.table_schema(&table)?.clone();
            let file = open_table(&catalog, &mut buffer_mgr, &table)?;
            let scanner = TableScanner::new(&schema, file);
            let rows = scanner.scan(&mut buffer_mgr)?;
            scanner.to_table(&rows).printstd();
            println!("{} rows", rows.len());
        }
        Command::Join {
            left,
            right,
            pages,
            into,
            algorithm,
        } => {
            let name = into.unwrap_or_else(|| format!("{}_{}", left, right));
            if catalog.get_table(&name).is_ok() {
                return Err(CatalogError::TableExists(name).into());
            }
            if pages > cli.pool_pages {
                warn!(pages, pool_pages = cli.pool_pages, "join budget exceeds the buffer pool");
            }

            let left_schema = catalog.table_schema(&left)?.clone();
            let right_schema = catalog.table_schema(&right)?.clone();
            let path = table_path(&cli.data_dir, &name);
            let result_file = HeapFile::create(&mut buffer_mgr, &path)?;

            let mut join = JoinOperator::new(algorithm, left_schema, right_schema, &catalog);
            if let Err(e) = join.execute(&mut buffer_mgr, pages, result_file) {
                let _ = buffer_mgr.flush_file(result_file);
                let _ = buffer_mgr.file_manager_mut().remove_file(&path);
                return Err(e.into());
            }
            let stats = join.stats();
            let result_schema = join.result_schema().renamed(name.clone());

            catalog.add_table(result_schema, path.to_string_lossy())?;
            catalog.save(&cli.data_dir)?;
            info!(table = %name, "join result stored");
            println!("{}", stats);
            println!("Result stored in table {}", name);
        }
    }

    buffer_mgr.flush_all()?;
    Ok(())
}

fn table_path(data_dir: &Path, table: &str) -> PathBuf {
    data_dir.join(format!("{}.tbl", table))
}

fn open_table(
    catalog: &Catalog,
    buffer_mgr: &mut BufferManager,
    table: &str,
) -> CliResult<FileHandle> {
    let id = catalog.table_id(table)?;
    let filename = catalog.table_filename(id)?;
    Ok(buffer_mgr.file_manager_mut().open_file(filename)?)
}

/// Parse CSV rows by the schema's types and append them to `file`
fn load_csv(
    buffer_mgr: &mut BufferManager,
    schema: &TableSchema,
    file: FileHandle,
    csv_path: &Path,
    delimiter: char,
) -> CliResult<usize> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .from_path(csv_path)?;

    let mut inserted = 0;
    for result in reader.records() {
        let record = result?;
        if record.len() != schema.attr_count() {
            return Err(RecordError::SchemaMismatch(format!(
                "line {}: expected {} fields, got {}",
                inserted + 1,
                schema.attr_count(),
                record.len()
            ))
            .into());
        }

        let values = record
            .iter()
            .zip(schema.attributes())
            .map(|(field, attr)| Value::parse(field, &attr.data_type))
            .collect::<RecordResult<Vec<_>>>()?;
        let tuple = encode_tuple(schema, &values)?;
        HeapFile::insert_tuple(buffer_mgr, file, &tuple)?;
        inserted += 1;
    }

    Ok(inserted)
}
