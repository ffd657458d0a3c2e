use ahash::AHashMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, trace};

use super::error::{JoinError, JoinResult};
use crate::catalog::Catalog;
use crate::file::{BufferManager, FileHandle, PageId, PinnedPage};
use crate::record::{
    HeapFile, HeapPage, TableSchema, common_attributes, extract_join_key_and_remainder, join_key,
    join_result_schema,
};

/// Join strategies. Only the block nested-loop join is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinAlgorithm {
    NestedLoop,
    OnePass,
    GraceHash,
}

impl fmt::Display for JoinAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinAlgorithm::NestedLoop => write!(f, "nested-loop"),
            JoinAlgorithm::OnePass => write!(f, "one-pass"),
            JoinAlgorithm::GraceHash => write!(f, "grace-hash"),
        }
    }
}

impl FromStr for JoinAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "nested-loop" | "nlj" | "bnlj" => Ok(JoinAlgorithm::NestedLoop),
            "one-pass" | "onepass" => Ok(JoinAlgorithm::OnePass),
            "grace-hash" | "grace" => Ok(JoinAlgorithm::GraceHash),
            other => Err(format!("unknown join algorithm: {}", other)),
        }
    }
}

/// Running statistics of one join execution.
///
/// `ios` and `used_buf_pages` both count page fetches from either relation,
/// across all passes. They approximate cost; they are not a count of
/// distinct resident frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    pub result_tuples: usize,
    pub used_buf_pages: usize,
    pub ios: usize,
}

impl JoinStats {
    fn page_fetched(&mut self) {
        self.used_buf_pages += 1;
        self.ios += 1;
    }
}

impl fmt::Display for JoinStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Result Tuples: {}", self.result_tuples)?;
        writeln!(f, "# Used Buffer Pages: {}", self.used_buf_pages)?;
        write!(f, "# I/Os: {}", self.ios)
    }
}

/// Equality join of two catalogued tables on every attribute they share
/// (same name and type).
///
/// Result tuples are the left tuple's bytes followed by the right tuple's
/// non-shared attributes in right-schema order, matching
/// [`JoinOperator::result_schema`]. With no shared attributes every pair
/// matches.
pub struct JoinOperator<'a> {
    algorithm: JoinAlgorithm,
    left_schema: TableSchema,
    right_schema: TableSchema,
    result_schema: TableSchema,
    catalog: &'a Catalog,
    is_complete: bool,
    stats: JoinStats,
}

impl<'a> JoinOperator<'a> {
    pub fn new(
        algorithm: JoinAlgorithm,
        left_schema: TableSchema,
        right_schema: TableSchema,
        catalog: &'a Catalog,
    ) -> Self {
        let result_schema = join_result_schema(&left_schema, &right_schema);
        Self {
            algorithm,
            left_schema,
            right_schema,
            result_schema,
            catalog,
            is_complete: false,
            stats: JoinStats::default(),
        }
    }

    pub fn algorithm(&self) -> JoinAlgorithm {
        self.algorithm
    }

    pub fn result_schema(&self) -> &TableSchema {
        &self.result_schema
    }

    pub fn stats(&self) -> JoinStats {
        self.stats
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Run the join, appending result tuples to `result_file`.
    ///
    /// At most `available_pages` frames are pinned at once. Once the join
    /// has completed, further calls return immediately without touching
    /// the pool.
    pub fn execute(
        &mut self,
        buffer_mgr: &mut BufferManager,
        available_pages: usize,
        result_file: FileHandle,
    ) -> JoinResult<()> {
        if self.is_complete {
            return Ok(());
        }

        match self.algorithm {
            JoinAlgorithm::NestedLoop => {}
            other => return Err(JoinError::NotSupported(other)),
        }
        if available_pages < 2 {
            return Err(JoinError::InsufficientBuffer {
                available: available_pages,
            });
        }

        self.stats = JoinStats::default();
        let left_file = open_table(self.catalog, buffer_mgr, &self.left_schema)?;
        let right_file = open_table(self.catalog, buffer_mgr, &self.right_schema)?;

        let common = common_attributes(&self.left_schema, &self.right_schema);
        let mut common_names: Vec<&str> = Vec::with_capacity(common.len());
        for attr in &common {
            if !common_names.contains(&attr.name.as_str()) {
                common_names.push(attr.name.as_str());
            }
        }
        let right_pages: Vec<PageId> = buffer_mgr.file_manager().page_ids(right_file)?.collect();

        let sides = JoinSides {
            left_schema: &self.left_schema,
            right_schema: &self.right_schema,
            common_names: &common_names,
            left_file,
            right_file,
            result_file,
        };

        // One page stays free for the probe side
        for (pass, block) in right_pages.chunks(available_pages - 1).enumerate() {
            debug!(
                pass,
                first_page = block[0],
                pages = block.len(),
                "nested loop join pass"
            );

            let mut pins = Vec::with_capacity(block.len());
            let outcome = run_pass(buffer_mgr, &sides, block, &mut pins, &mut self.stats);
            let released = pins
                .into_iter()
                .try_for_each(|pin| buffer_mgr.release(pin, false));
            outcome?;
            released?;
            buffer_mgr.flush_file(right_file)?;
        }

        self.is_complete = true;
        debug!(
            result_tuples = self.stats.result_tuples,
            used_buf_pages = self.stats.used_buf_pages,
            ios = self.stats.ios,
            "join complete"
        );
        Ok(())
    }
}

struct JoinSides<'s> {
    left_schema: &'s TableSchema,
    right_schema: &'s TableSchema,
    common_names: &'s [&'s str],
    left_file: FileHandle,
    right_file: FileHandle,
    result_file: FileHandle,
}

fn open_table(
    catalog: &Catalog,
    buffer_mgr: &mut BufferManager,
    schema: &TableSchema,
) -> JoinResult<FileHandle> {
    let id = catalog.table_id(schema.table_name())?;
    let filename = catalog.table_filename(id)?;
    Ok(buffer_mgr.file_manager_mut().open_file(filename)?)
}

/// Build a key map from one block of right pages, left pinned in `pins`,
/// then probe it with every left page.
fn run_pass(
    buffer_mgr: &mut BufferManager,
    sides: &JoinSides<'_>,
    block: &[PageId],
    pins: &mut Vec<PinnedPage>,
    stats: &mut JoinStats,
) -> JoinResult<()> {
    let mut remainders: AHashMap<Vec<u8>, Vec<Vec<u8>>> = AHashMap::new();

    for &page_id in block {
        let pin = buffer_mgr.fetch_page(sides.right_file, page_id)?;
        stats.page_fetched();

        let built = buffer_mgr
            .page(&pin)
            .map_err(JoinError::from)
            .and_then(|bytes| {
                let page = HeapPage::from_buffer(bytes)?;
                for tuple in page.tuples() {
                    let (key, remainder) =
                        extract_join_key_and_remainder(tuple, sides.common_names, sides.right_schema)?;
                    remainders.entry(key).or_default().push(remainder);
                }
                Ok(())
            });
        pins.push(pin);
        built?;
    }

    let left_pages: Vec<PageId> = buffer_mgr
        .file_manager()
        .page_ids(sides.left_file)?
        .collect();

    for page_id in left_pages {
        let pin = buffer_mgr.fetch_page(sides.left_file, page_id)?;
        stats.page_fetched();

        let joined = buffer_mgr
            .page(&pin)
            .map_err(JoinError::from)
            .and_then(|bytes| probe_page(bytes, sides, &remainders));
        buffer_mgr.release(pin, false)?;

        for tuple in joined? {
            HeapFile::insert_tuple(buffer_mgr, sides.result_file, &tuple)?;
            stats.result_tuples += 1;
        }
    }

    Ok(())
}

fn probe_page(
    bytes: &[u8],
    sides: &JoinSides<'_>,
    remainders: &AHashMap<Vec<u8>, Vec<Vec<u8>>>,
) -> JoinResult<Vec<Vec<u8>>> {
    let page = HeapPage::from_buffer(bytes)?;
    let mut joined = Vec::new();

    for tuple in page.tuples() {
        let key = join_key(tuple, sides.common_names, sides.left_schema)?;
        let Some(matches) = remainders.get(&key) else {
            continue;
        };
        trace!(matches = matches.len(), "probe hit");
        for remainder in matches {
            let mut result = Vec::with_capacity(tuple.len() + remainder.len());
            result.extend_from_slice(tuple);
            result.extend_from_slice(remainder);
            joined.push(result);
        }
    }

    Ok(joined)
}
