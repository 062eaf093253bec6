//! Character-level diff between two canonical texts.
//!
//! Edits are found with Myers' O(ND) bisection, then small coincidental
//! equalities are folded into the surrounding edits so that a replaced word
//! shows up as one delete and one insert rather than a scatter of letters.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Budget for a single diff; past it the remaining region is reported as one replacement
const DIFF_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Delete,
    Insert,
}

/// One contiguous insertion or deletion.
///
/// `position` is a byte offset into the old text for deletions and into the
/// new text for insertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffBlock {
    pub kind: BlockKind,
    pub text: String,
    pub position: usize,
}

impl DiffBlock {
    pub fn delete(text: impl Into<String>, position: usize) -> Self {
        Self {
            kind: BlockKind::Delete,
            text: text.into(),
            position,
        }
    }

    pub fn insert(text: impl Into<String>, position: usize) -> Self {
        Self {
            kind: BlockKind::Insert,
            text: text.into(),
            position,
        }
    }

    /// True when the block carries nothing but whitespace
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// `- text` or `+ text`
    pub fn render(&self) -> String {
        match self.kind {
            BlockKind::Delete => format!("- {}", self.text),
            BlockKind::Insert => format!("+ {}", self.text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Edit {
    Equal(Vec<char>),
    Delete(Vec<char>),
    Insert(Vec<char>),
}

impl Edit {
    fn len(&self) -> usize {
        match self {
            Edit::Equal(t) | Edit::Delete(t) | Edit::Insert(t) => t.len(),
        }
    }
}

/// Every insertion and deletion turning `old` into `new`, in document order
pub fn diff(old: &str, new: &str) -> Vec<DiffBlock> {
    diff_with_deadline(old, new, Instant::now() + DIFF_TIMEOUT)
}

/// The blocks of [`diff`] minus the whitespace-only ones
pub fn changes(old: &str, new: &str) -> Vec<DiffBlock> {
    drop_blank(diff(old, new))
}

/// Drops blocks that are empty once trimmed
pub fn drop_blank(blocks: Vec<DiffBlock>) -> Vec<DiffBlock> {
    blocks.into_iter().filter(|b| !b.is_blank()).collect()
}

/// Renders blocks as `- deleted` / `+ inserted` lines
pub fn render(blocks: &[DiffBlock]) -> String {
    blocks
        .iter()
        .map(DiffBlock::render)
        .collect::<Vec<_>>()
        .join("\n")
}

fn diff_with_deadline(old: &str, new: &str, deadline: Instant) -> Vec<DiffBlock> {
    let a: Vec<char> = old.chars().collect();
    let b: Vec<char> = new.chars().collect();

    let mut edits = merge(diff_chars(&a, &b, deadline));
    cleanup_semantic(&mut edits);

    to_blocks(&edits)
}

fn to_blocks(edits: &[Edit]) -> Vec<DiffBlock> {
    let byte_len = |t: &[char]| t.iter().map(|c| c.len_utf8()).sum::<usize>();

    let mut blocks = Vec::new();
    let (mut old_pos, mut new_pos) = (0, 0);
    for edit in edits {
        match edit {
            Edit::Equal(t) => {
                let len = byte_len(t);
                old_pos += len;
                new_pos += len;
            }
            Edit::Delete(t) => {
                blocks.push(DiffBlock::delete(t.iter().collect::<String>(), old_pos));
                old_pos += byte_len(t);
            }
            Edit::Insert(t) => {
                blocks.push(DiffBlock::insert(t.iter().collect::<String>(), new_pos));
                new_pos += byte_len(t);
            }
        }
    }
    blocks
}

fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

fn diff_chars(a: &[char], b: &[char], deadline: Instant) -> Vec<Edit> {
    if a == b {
        return if a.is_empty() {
            Vec::new()
        } else {
            vec![Edit::Equal(a.to_vec())]
        };
    }

    let prefix = common_prefix(a, b);
    let (a_rest, b_rest) = (&a[prefix..], &b[prefix..]);
    let suffix = common_suffix(a_rest, b_rest);
    let a_mid = &a_rest[..a_rest.len() - suffix];
    let b_mid = &b_rest[..b_rest.len() - suffix];

    let mut edits = Vec::new();
    if prefix > 0 {
        edits.push(Edit::Equal(a[..prefix].to_vec()));
    }
    edits.extend(diff_middle(a_mid, b_mid, deadline));
    if suffix > 0 {
        edits.push(Edit::Equal(a_rest[a_rest.len() - suffix..].to_vec()));
    }
    edits
}

/// Diff of two texts sharing neither prefix nor suffix
fn diff_middle(a: &[char], b: &[char], deadline: Instant) -> Vec<Edit> {
    if a.is_empty() {
        return vec![Edit::Insert(b.to_vec())];
    }
    if b.is_empty() {
        return vec![Edit::Delete(a.to_vec())];
    }

    let a_is_longer = a.len() > b.len();
    let (long, short) = if a_is_longer { (a, b) } else { (b, a) };

    // Shorter text inside the longer one
    if let Some(i) = long.windows(short.len()).position(|w| w == short) {
        let outer = |t: &[char]| {
            if a_is_longer {
                Edit::Delete(t.to_vec())
            } else {
                Edit::Insert(t.to_vec())
            }
        };
        return vec![
            outer(&long[..i]),
            Edit::Equal(short.to_vec()),
            outer(&long[i + short.len()..]),
        ];
    }

    // A single character that is not in the other text
    if short.len() == 1 {
        return vec![Edit::Delete(a.to_vec()), Edit::Insert(b.to_vec())];
    }

    bisect(a, b, deadline)
}

/// Finds the middle snake of the edit graph and recurses on both halves
fn bisect(a: &[char], b: &[char], deadline: Instant) -> Vec<Edit> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max_d = (n + m + 1) / 2;
    let v_offset = max_d;
    let v_length = 2 * max_d + 2;
    let mut v1 = vec![-1isize; v_length as usize];
    let mut v2 = vec![-1isize; v_length as usize];
    v1[(v_offset + 1) as usize] = 0;
    v2[(v_offset + 1) as usize] = 0;

    let delta = n - m;
    // With an odd delta the forward path is the one that detects overlap
    let front = delta % 2 != 0;

    // Diagonals outside the grid are trimmed from subsequent rounds
    let (mut k1start, mut k1end, mut k2start, mut k2end) = (0isize, 0isize, 0isize, 0isize);

    for d in 0..max_d {
        if Instant::now() > deadline {
            ::log::debug!("Diff budget exhausted at edit distance {}", d);
            break;
        }

        // Forward path
        let mut k1 = -d + k1start;
        while k1 <= d - k1end {
            let k1_offset = (v_offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && v1[k1_offset - 1] < v1[k1_offset + 1]) {
                v1[k1_offset + 1]
            } else {
                v1[k1_offset - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 >= 0 && y1 >= 0 && x1 < n && y1 < m && a[x1 as usize] == b[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            v1[k1_offset] = x1;

            if x1 > n {
                k1end += 2;
            } else if y1 > m {
                k1start += 2;
            } else if front {
                let k2_offset = v_offset + delta - k1;
                if k2_offset >= 0 && k2_offset < v_length && v2[k2_offset as usize] != -1 {
                    // Mirror the reverse path onto forward coordinates
                    let x2 = n - v2[k2_offset as usize];
                    if x1 >= x2 && y1 >= 0 {
                        return bisect_split(a, b, x1 as usize, y1 as usize, deadline);
                    }
                }
            }
            k1 += 2;
        }

        // Reverse path
        let mut k2 = -d + k2start;
        while k2 <= d - k2end {
            let k2_offset = (v_offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && v2[k2_offset - 1] < v2[k2_offset + 1]) {
                v2[k2_offset + 1]
            } else {
                v2[k2_offset - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 >= 0
                && y2 >= 0
                && x2 < n
                && y2 < m
                && a[(n - x2 - 1) as usize] == b[(m - y2 - 1) as usize]
            {
                x2 += 1;
                y2 += 1;
            }
            v2[k2_offset] = x2;

            if x2 > n {
                k2end += 2;
            } else if y2 > m {
                k2start += 2;
            } else if !front {
                let k1_offset = v_offset + delta - k2;
                if k1_offset >= 0 && k1_offset < v_length && v1[k1_offset as usize] != -1 {
                    let x1 = v1[k1_offset as usize];
                    let y1 = v_offset + x1 - k1_offset;
                    let x2 = n - x2;
                    if x1 >= x2 && x1 <= n && y1 >= 0 && y1 <= m {
                        return bisect_split(a, b, x1 as usize, y1 as usize, deadline);
                    }
                }
            }
            k2 += 2;
        }
    }

    // No overlap found within budget
    vec![Edit::Delete(a.to_vec()), Edit::Insert(b.to_vec())]
}

fn bisect_split(a: &[char], b: &[char], x: usize, y: usize, deadline: Instant) -> Vec<Edit> {
    let mut edits = diff_chars(&a[..x], &b[..y], deadline);
    edits.extend(diff_chars(&a[x..], &b[y..], deadline));
    edits
}

/// Coalesces adjacent edits: every run between two equalities becomes at most
/// one deletion followed by one insertion, and text common to both ends of the
/// run is moved out into the neighbouring equalities.
fn merge(edits: Vec<Edit>) -> Vec<Edit> {
    let mut out: Vec<Edit> = Vec::with_capacity(edits.len());
    let mut deleted: Vec<char> = Vec::new();
    let mut inserted: Vec<char> = Vec::new();

    // The trailing empty equality flushes the last run
    for edit in edits.into_iter().chain(std::iter::once(Edit::Equal(Vec::new()))) {
        match edit {
            Edit::Delete(t) => deleted.extend(t),
            Edit::Insert(t) => inserted.extend(t),
            Edit::Equal(mut t) => {
                if !deleted.is_empty() && !inserted.is_empty() {
                    let prefix = common_prefix(&deleted, &inserted);
                    if prefix > 0 {
                        push_equal(&mut out, &inserted[..prefix]);
                        deleted.drain(..prefix);
                        inserted.drain(..prefix);
                    }
                    let suffix = common_suffix(&deleted, &inserted);
                    if suffix > 0 {
                        let mut moved = inserted[inserted.len() - suffix..].to_vec();
                        moved.extend(t);
                        t = moved;
                        deleted.truncate(deleted.len() - suffix);
                        inserted.truncate(inserted.len() - suffix);
                    }
                }
                if !deleted.is_empty() {
                    out.push(Edit::Delete(std::mem::take(&mut deleted)));
                }
                if !inserted.is_empty() {
                    out.push(Edit::Insert(std::mem::take(&mut inserted)));
                }
                push_equal(&mut out, &t);
            }
        }
    }
    out
}

fn push_equal(out: &mut Vec<Edit>, text: &[char]) {
    if text.is_empty() {
        return;
    }
    if let Some(Edit::Equal(last)) = out.last_mut() {
        last.extend_from_slice(text);
    } else {
        out.push(Edit::Equal(text.to_vec()));
    }
}

/// Folds an equality into its neighbours when it is no longer than the edits
/// on either side of it.
fn cleanup_semantic(edits: &mut Vec<Edit>) {
    let mut changed = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<usize> = None;
    // Inserted/deleted lengths before and after the last equality
    let (mut ins_before, mut del_before, mut ins_after, mut del_after) = (0, 0, 0, 0);

    let mut pointer: isize = 0;
    while (pointer as usize) < edits.len() {
        let index = pointer as usize;
        let len = edits[index].len();
        match edits[index] {
            Edit::Equal(_) => {
                equalities.push(index);
                ins_before = ins_after;
                del_before = del_after;
                ins_after = 0;
                del_after = 0;
                last_equality = Some(len);
            }
            Edit::Insert(_) | Edit::Delete(_) => {
                if matches!(edits[index], Edit::Insert(_)) {
                    ins_after += len;
                } else {
                    del_after += len;
                }

                let swallowed = match last_equality {
                    Some(eq_len) => {
                        eq_len <= ins_before.max(del_before) && eq_len <= ins_after.max(del_after)
                    }
                    None => false,
                };
                if swallowed {
                    if let Some(&eq_index) = equalities.last() {
                        if let Edit::Equal(text) = edits[eq_index].clone() {
                            edits[eq_index] = Edit::Insert(text.clone());
                            edits.insert(eq_index, Edit::Delete(text));
                        }
                    }
                    // Drop the folded equality and re-evaluate the one before it
                    equalities.pop();
                    equalities.pop();
                    pointer = equalities.last().map(|&i| i as isize).unwrap_or(-1);
                    ins_before = 0;
                    del_before = 0;
                    ins_after = 0;
                    del_after = 0;
                    last_equality = None;
                    changed = true;
                }
            }
        }
        pointer += 1;
    }

    if changed {
        *edits = merge(std::mem::take(edits));
    }
}
