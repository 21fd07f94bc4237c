/*
 * BSD 2-Clause License
 *
 * Copyright (c) 2021, Khaled Emara
 * All rights reserved.
 *
 * Redistribution and use in source and binary forms, with or without
 * modification, are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 *    list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice,
 *    this list of conditions and the following disclaimer in the documentation
 *    and/or other materials provided with the distribution.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
 * AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
 * IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
 * DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
 * FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
 * DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
 * SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
 * CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
 * OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
 * OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
 */
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Read, Seek};

use bincode_next::Decode;
use md5::{Digest, Md5};
use tracing::{debug, warn};

use super::block::Block;
use super::buddy::Allocator;
use super::definitions::{self, NodeId};
use super::entry::{DecodeMode, DsStoreEntry};
use super::error::Result;
use super::record::DsStoreRecord;
use super::utils::decode;

/// Name of the TOC entry holding the B-tree superblock.
const DSDB: &str = "DSDB";

/// B-tree metadata from the `DSDB` block.
#[derive(Clone, Copy, Debug, Decode)]
pub struct Superblock {
    pub root_node: u32,
    pub levels:    u32,
    pub records:   u32,
    pub nodes:     u32,
    pub page_size: u32,
}

/// Read-only view of one `.DS_Store` file.
///
/// Not safe for concurrent use: the allocator shares one file cursor and
/// the provenance maps are per-store.  Distinct stores can be processed
/// on independent threads.
#[derive(Debug)]
pub struct DsStore<R> {
    alloc:    Allocator<R>,
    sb:       Superblock,
    src_name: String,
}

impl<R: Read + Seek> DsStore<R> {
    /// Open a store over a random-access byte source.  `src_name` is the
    /// logical identity of the source (normally the file path); it feeds
    /// the provenance hash.
    pub fn open(source: R, src_name: impl Into<String>) -> Result<Self> {
        let mut alloc = Allocator::open(source)?;
        let id = alloc.lookup(DSDB)?;
        let superblock = alloc.get_block(id)?;
        let (sb, _) = decode::<Superblock>(superblock.as_slice())?;
        debug!(
            root = sb.root_node,
            levels = sb.levels,
            records = sb.records,
            page_size = sb.page_size,
            "opened store"
        );
        Ok(DsStore {
            alloc,
            sb,
            src_name: src_name.into(),
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn source_name(&self) -> &str {
        &self.src_name
    }

    /// Walk the tree (and the slack behind it), collapse duplicate
    /// sightings, and return the unique records sorted by
    /// `(case-folded filename, code)`.  The order is fully determined by
    /// the file contents.
    pub fn records(&mut self) -> Vec<DsStoreRecord> {
        let mut tracker = Provenance::new(&self.src_name);
        for sighting in Walker::new(&mut self.alloc, self.sb.root_node) {
            tracker.observe(sighting);
        }
        let mut entries = tracker.into_entries();
        entries.sort_by_cached_key(|e| e.sort_key());
        entries.into_iter().map(DsStoreRecord::new).collect()
    }
}

/// Where a record sighting came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Origin {
    Allocated(NodeId),
    Slack,
}

struct Sighting {
    entry:  DsStoreEntry,
    origin: Origin,
}

/// One in-flight node of the in-order traversal.
struct Frame {
    node:           NodeId,
    block:          Block,
    next:           NodeId,
    count:          u32,
    emitted:        u32,
    child_pushed:   bool,
    descended_next: bool,
}

enum Phase {
    Tree,
    FreeLists,
    Done,
}

/// In-order depth-first traversal driven by an explicit frame stack, so
/// pathological trees cannot exhaust the call stack and dropping the
/// walker cancels the whole walk.  Leaf tails are scanned for slack as
/// each leaf completes; free-list regions are scanned after the tree.
struct Walker<'a, R> {
    alloc:    &'a mut Allocator<R>,
    stack:    Vec<Frame>,
    pending:  VecDeque<Sighting>,
    seen:     HashSet<NodeId>,
    free:     Vec<(u8, u32)>,
    free_idx: usize,
    phase:    Phase,
}

enum Step {
    Push(NodeId),
    Pop,
    ScanTail(Vec<u8>),
    Stay,
}

impl<'a, R: Read + Seek> Walker<'a, R> {
    fn new(alloc: &'a mut Allocator<R>, root: NodeId) -> Self {
        let free = alloc
            .free_lists()
            .iter()
            .enumerate()
            .flat_map(|(class, bucket)| bucket.iter().map(move |&off| (class as u8, off)))
            .collect();
        let mut walker = Walker {
            alloc,
            stack: Vec::new(),
            pending: VecDeque::new(),
            seen: HashSet::new(),
            free,
            free_idx: 0,
            phase: Phase::Tree,
        };
        walker.push_node(root);
        walker
    }

    fn push_node(&mut self, node: NodeId) {
        if !self.seen.insert(node) {
            warn!(node, "node referenced twice, skipping to break the cycle");
            return;
        }
        match self.load_node(node) {
            Ok(frame) => self.stack.push(frame),
            Err(e) => warn!(node, error = %e, "skipping unreadable node"),
        }
    }

    fn load_node(&mut self, node: NodeId) -> Result<Frame> {
        let mut block = self.alloc.get_block(node)?;
        let next = block.read_u32()?;
        let count = block.read_u32()?;
        Ok(Frame {
            node,
            block,
            next,
            count,
            emitted: 0,
            child_pushed: false,
            descended_next: false,
        })
    }

    /// Candidate record starts in a slack region: a four-byte length with
    /// a nonzero low byte, at least one UTF-16BE unit, then a known code
    /// and type tag.  Matches are greedy and non-overlapping, preferring
    /// the longest filename run.
    fn candidates(data: &[u8]) -> Vec<usize> {
        let mut out = Vec::new();
        let mut i = 0;
        while i + 14 <= data.len() {
            if data[i] != 0 || data[i + 1] != 0 || data[i + 2] != 0 || data[i + 3] == 0 {
                i += 1;
                continue;
            }
            let mut pairs = 0;
            while i + 4 + 2 * (pairs + 1) + 1 <= data.len()
                && data[i + 4 + 2 * pairs] == 0
                && data[i + 5 + 2 * pairs] != 0
            {
                pairs += 1;
            }
            let mut matched = None;
            let mut k = pairs;
            while k >= 1 {
                let p = i + 4 + 2 * k;
                if p + 8 <= data.len()
                    && definitions::is_known_code(&data[p..p + 4])
                    && definitions::is_type_tag(&data[p + 4..p + 8])
                {
                    matched = Some(p + 8);
                    break;
                }
                k -= 1;
            }
            match matched {
                Some(end) => {
                    out.push(i);
                    i = end;
                }
                None => i += 1,
            }
        }
        out
    }

    fn scan_slack(&mut self, data: &[u8]) {
        let starts = Self::candidates(data);
        // Each candidate except the first decodes from the previous
        // candidate's start; the first may be the tail of a live record.
        for pair in starts.windows(2) {
            let mut block = Block::new(data[pair[0]..].to_vec());
            match DsStoreEntry::read(&mut block, DecodeMode::Slack) {
                Ok(entry) => self.pending.push_back(Sighting {
                    entry,
                    origin: Origin::Slack,
                }),
                Err(e) => warn!(error = %e, "unable to parse slack entry"),
            }
        }
    }
}

impl<R: Read + Seek> Iterator for Walker<'_, R> {
    type Item = Sighting;

    fn next(&mut self) -> Option<Sighting> {
        loop {
            if let Some(s) = self.pending.pop_front() {
                return Some(s);
            }
            match self.phase {
                Phase::Tree => {
                    let Some(frame) = self.stack.last_mut() else {
                        self.phase = Phase::FreeLists;
                        continue;
                    };
                    let step = if frame.emitted >= frame.count {
                        if frame.next != 0 {
                            if !frame.descended_next {
                                frame.descended_next = true;
                                Step::Push(frame.next)
                            } else {
                                Step::Pop
                            }
                        } else {
                            Step::ScanTail(frame.block.rest().to_vec())
                        }
                    } else if frame.next != 0 && !frame.child_pushed {
                        frame.child_pushed = true;
                        match frame.block.read_u32() {
                            Ok(child) => Step::Push(child),
                            Err(e) => {
                                warn!(node = frame.node, error = %e, "truncated internal node");
                                frame.emitted = frame.count;
                                Step::Stay
                            }
                        }
                    } else {
                        frame.child_pushed = false;
                        match DsStoreEntry::read(&mut frame.block, DecodeMode::Tree) {
                            Ok(entry) => {
                                frame.emitted += 1;
                                let origin = Origin::Allocated(frame.node);
                                return Some(Sighting { entry, origin });
                            }
                            Err(e) => {
                                // The cursor position of the following
                                // records is unknowable after a failed
                                // decode; give up on this node only.
                                warn!(
                                    node = frame.node,
                                    error = %e,
                                    "dropping undecodable record and the rest of its node"
                                );
                                frame.emitted = frame.count;
                                Step::Stay
                            }
                        }
                    };
                    match step {
                        Step::Push(node) => self.push_node(node),
                        Step::Pop => {
                            self.stack.pop();
                        }
                        Step::ScanTail(tail) => {
                            self.stack.pop();
                            self.scan_slack(&tail);
                        }
                        Step::Stay => {}
                    }
                }
                Phase::FreeLists => {
                    if self.free_idx >= self.free.len() {
                        self.phase = Phase::Done;
                        continue;
                    }
                    let (class, offset) = self.free[self.free_idx];
                    self.free_idx += 1;
                    // Past EOF there is only zero fill, which the scanner
                    // pattern can never match; clamp the read.
                    let limit = self.alloc.len().saturating_sub(u64::from(offset));
                    let len = (1u64 << class).min(limit) as usize;
                    if len == 0 {
                        continue;
                    }
                    match self.alloc.read(u64::from(offset), len) {
                        Ok(region) => self.scan_slack(&region),
                        Err(e) => warn!(offset, error = %e, "unable to read free-list region"),
                    }
                }
                Phase::Done => return None,
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Status {
    Allocated,
    Unallocated,
    Reallocated,
}

/// Content-hash deduplication of sightings.  A record seen both in slack
/// and later in an allocated node was reallocated; any other repeat
/// sighting is dropped.  The hash is pure over the listed fields, so the
/// outcome never depends on map iteration order.
struct Provenance {
    src_name: String,
    status:   HashMap<[u8; 16], Status>,
    entries:  HashMap<[u8; 16], DsStoreEntry>,
    order:    Vec<[u8; 16]>,
}

impl Provenance {
    fn new(src_name: &str) -> Self {
        Provenance {
            src_name: src_name.into(),
            status: HashMap::new(),
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn digest(&self, e: &DsStoreEntry) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(e.filename.as_bytes());
        hasher.update(e.kind.label().as_bytes());
        hasher.update(e.code.to_string().as_bytes());
        hasher.update(self.src_name.as_bytes());
        hasher.update(e.value.canonical().as_bytes());
        hasher.finalize().into()
    }

    fn observe(&mut self, sighting: Sighting) {
        let key = self.digest(&sighting.entry);
        match (self.status.get(&key), sighting.origin) {
            (None, Origin::Allocated(node)) => {
                let mut e = sighting.entry;
                e.node = format!("allocated {node}");
                self.status.insert(key, Status::Allocated);
                self.entries.insert(key, e);
                self.order.push(key);
            }
            (None, Origin::Slack) => {
                let mut e = sighting.entry;
                e.node = "unallocated".into();
                self.status.insert(key, Status::Unallocated);
                self.entries.insert(key, e);
                self.order.push(key);
            }
            (Some(Status::Unallocated), Origin::Allocated(node)) => {
                // the stale copy was seen first; this is its live home
                let mut e = sighting.entry;
                e.node = format!("unallocated, reallocated in {node}");
                self.status.insert(key, Status::Reallocated);
                self.entries.insert(key, e);
            }
            _ => {}
        }
    }

    /// Unique entries in first-sighting order.
    fn into_entries(self) -> Vec<DsStoreEntry> {
        let mut entries = self.entries;
        self.order
            .into_iter()
            .filter_map(|key| entries.remove(&key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::entry::{Kind, Value};
    use super::super::testutil::{record_bytes, StoreBuilder};
    use super::*;

    const ILOC_PAYLOAD: [u8; 16] = [
        0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x14, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00,
        0x00,
    ];

    fn iloc_value() -> Vec<u8> {
        let mut v = 16u32.to_be_bytes().to_vec();
        v.extend(ILOC_PAYLOAD);
        v
    }

    #[test]
    fn empty_tree_yields_nothing() {
        let mut store = StoreBuilder::new().leaf(&[]).build_store("empty");
        assert_eq!(store.superblock().records, 0);
        assert!(store.records().is_empty());
    }

    #[test]
    fn single_record() {
        let mut store = StoreBuilder::new()
            .leaf(&[record_bytes("foo.txt", b"Iloc", b"blob", &iloc_value())])
            .superblock(2, 0, 1)
            .build_store("single");
        let records = store.records();
        assert_eq!(records.len(), 1);
        let e = records[0].entry();
        assert_eq!(e.filename, "foo.txt");
        assert_eq!(e.kind, Kind::Codec("IlocCodec"));
        assert_eq!(
            e.value,
            Value::Rendered(
                "Location: (10, 20), Selected Index: Null, Unknown: 00000000".into()
            )
        );
        assert_eq!(e.node, "allocated 2");
    }

    /// An internal node interleaves child pointers and records; the
    /// in-order walk must visit child 0, the record, then `next`.
    #[test]
    fn internal_node_in_order() {
        let rec = |name: &str| record_bytes(name, b"logS", b"long", &1u32.to_be_bytes());
        let mut store = StoreBuilder::new()
            .leaf(&[rec("aaa")]) // id 2
            .leaf(&[rec("ccc")]) // id 3
            .internal(3, &[(2, rec("bbb"))]) // id 4
            .superblock(4, 1, 3)
            .build_store("internal");
        let records = store.records();
        let names: Vec<_> = records.iter().map(|r| r.entry().filename.clone()).collect();
        assert_eq!(names, ["aaa", "bbb", "ccc"]);
        assert_eq!(records[0].entry().node, "allocated 2");
        assert_eq!(records[1].entry().node, "allocated 4");
        assert_eq!(records[2].entry().node, "allocated 3");
    }

    #[test]
    fn duplicate_allocated_records_collapse() {
        let rec = record_bytes("dup.txt", b"logS", b"long", &7u32.to_be_bytes());
        let mut store = StoreBuilder::new()
            .leaf(&[rec.clone()]) // id 2
            .leaf(&[rec]) // id 3
            .internal(3, &[(2, record_bytes("mmm", b"phyS", b"long", &8u32.to_be_bytes()))])
            .superblock(4, 1, 3)
            .build_store("dups");
        let records = store.records();
        assert_eq!(records.len(), 2);
        let dup = records.iter().find(|r| r.entry().filename == "dup.txt").unwrap();
        // the first sighting wins
        assert_eq!(dup.entry().node, "allocated 2");
    }

    /// A stale copy recovered from an early leaf's tail is upgraded once
    /// its live home turns up later in the walk.
    #[test]
    fn slack_copy_reallocated_by_later_sighting() {
        let stale = record_bytes("bar.txt", b"Iloc", b"blob", &iloc_value());
        // sentinel pattern so the stale record is not the last candidate
        let mut tail = stale.clone();
        tail.extend([0, 0, 0, 1, 0, b'z']);
        tail.extend(b"Ilocblob");
        let mut store = StoreBuilder::new()
            .leaf_with_tail(
                &[record_bytes("app.txt", b"logS", b"long", &1u32.to_be_bytes())],
                &tail,
            ) // id 2
            .leaf(&[stale]) // id 3: the live copy
            .internal(3, &[(2, record_bytes("mid", b"phyS", b"long", &2u32.to_be_bytes()))])
            .superblock(4, 1, 3)
            .build_store("realloc");
        let records = store.records();
        assert_eq!(records.len(), 3);
        let bar = records.iter().find(|r| r.entry().filename == "bar.txt").unwrap();
        assert_eq!(bar.entry().node, "unallocated, reallocated in 3");
    }

    /// Without a later allocated sighting the stale copy stays
    /// unallocated.
    #[test]
    fn slack_only_copy_stays_unallocated() {
        let stale = record_bytes("gone.txt", b"logS", b"long", &9u32.to_be_bytes());
        let mut tail = stale;
        tail.extend([0, 0, 0, 1, 0, b'z']);
        tail.extend(b"Ilocblob");
        let mut store = StoreBuilder::new()
            .leaf_with_tail(&[], &tail)
            .build_store("slack-only");
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry().filename, "gone.txt");
        assert_eq!(records[0].entry().value, Value::U32(9));
        assert_eq!(records[0].entry().node, "unallocated");
    }

    #[test]
    fn free_list_regions_are_scanned() {
        // 18-byte record plus a 14-byte sentinel pattern, exactly one
        // 32-byte free block
        let mut region = record_bytes("A", b"Iloc", b"shor", &7u32.to_be_bytes());
        assert_eq!(region.len(), 18);
        region.extend([0, 0, 0, 1, 0, b'B']);
        region.extend(b"Ilocshor");
        assert_eq!(region.len(), 32);
        let mut store = StoreBuilder::new()
            .leaf(&[])
            .free_region(5, region)
            .build_store("freelist");
        let records = store.records();
        assert_eq!(records.len(), 1);
        let e = records[0].entry();
        assert_eq!(e.filename, "A");
        assert_eq!(e.value, Value::U32(7));
        assert_eq!(e.node, "unallocated");
    }

    /// A record with an unknown type tag poisons only its own node.
    #[test]
    fn bad_record_does_not_abort_the_walk() {
        let mut store = StoreBuilder::new()
            .leaf(&[record_bytes("bad", b"cmmt", b"wxyz", &[])]) // id 2
            .leaf(&[record_bytes("good", b"logS", b"long", &3u32.to_be_bytes())]) // id 3
            .internal(3, &[(2, record_bytes("mid", b"phyS", b"long", &4u32.to_be_bytes()))])
            .superblock(4, 1, 3)
            .build_store("bad-record");
        let names: Vec<_> = store
            .records()
            .iter()
            .map(|r| r.entry().filename.clone())
            .collect();
        assert_eq!(names, ["good", "mid"]);
    }

    /// Running the iterator twice over the same input yields identical
    /// sequences.
    #[test]
    fn iteration_is_stable() {
        let stale = record_bytes("bar.txt", b"Iloc", b"blob", &iloc_value());
        let mut tail = stale;
        tail.extend([0, 0, 0, 1, 0, b'z']);
        tail.extend(b"Ilocblob");
        let mut store = StoreBuilder::new()
            .leaf_with_tail(
                &[record_bytes("app.txt", b"logS", b"long", &1u32.to_be_bytes())],
                &tail,
            )
            .leaf(&[record_bytes("zzz.txt", b"phyS", b"long", &2u32.to_be_bytes())])
            .internal(3, &[(2, record_bytes("mid", b"lg1S", b"long", &3u32.to_be_bytes()))])
            .superblock(4, 1, 3)
            .build_store("stable");
        let snapshot = |records: &[DsStoreRecord]| {
            records
                .iter()
                .map(|r| {
                    (
                        r.entry().filename.clone(),
                        r.entry().code,
                        r.entry().value.canonical(),
                        r.entry().node.clone(),
                    )
                })
                .collect::<Vec<_>>()
        };
        let first = snapshot(&store.records());
        let second = snapshot(&store.records());
        assert_eq!(first, second);
    }

    #[test]
    fn missing_dsdb_entry_fails_open() {
        let image = StoreBuilder::new().toc_name("XYZZ").build();
        let e = DsStore::open(std::io::Cursor::new(image), "noname").unwrap_err();
        assert!(matches!(e, super::super::error::Error::MissingName(_)));
    }

    #[test]
    fn slack_candidates_prefer_longest_run() {
        // 00 00 00 02 | 00 'a' 00 'b' | Iloc long : one candidate, two
        // filename units
        let mut data = vec![0, 0, 0, 2, 0, b'a', 0, b'b'];
        data.extend(b"Iloclong");
        data.extend(4u32.to_be_bytes());
        let c = Walker::<std::io::Cursor<Vec<u8>>>::candidates(&data);
        assert_eq!(c, vec![0]);
    }

    #[test]
    fn slack_candidates_skip_garbage_prefixes() {
        // noise bytes, then a real pattern
        let mut data = vec![0xFFu8; 3];
        data.extend([0, 0, 0, 1, 0, b'x']);
        data.extend(b"vstltype");
        data.extend(b"Nlsv");
        let c = Walker::<std::io::Cursor<Vec<u8>>>::candidates(&data);
        assert_eq!(c, vec![3]);
    }
}
