//! Conversation tree reconstruction.
//!
//! The backend stores a conversation as a flat list of messages, where a
//! user message refers to the reply it answers by id. Regenerating or
//! editing a message creates a sibling turn under the same parent, so the
//! turns form a tree. [`build_blocks`] groups the flat list into turns and
//! computes their branch metadata, [`ConversationTree::resolve_path`] picks
//! one displayable thread out of it.

mod builder;

use std::collections::HashMap;
use std::sync::Arc;

use layra_model::{Message, ROOT_PARENT_ID};

pub use builder::build_blocks;

/// Parent id of detached blocks. Message ids are never empty, so no
/// attached block shares it.
pub const DETACHED_PARENT_ID: &str = "";

/// One turn of the conversation: a user message and the reply to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationBlock {
    /// The user text of this turn.
    ///
    /// `None` for a detached block, which collects messages that couldn't
    /// be attached to any user text. Detached blocks are kept for
    /// inspection but are never part of a path.
    pub user_message: Option<Arc<Message>>,
    /// Non-text user messages of this turn (uploaded files and images).
    pub other_user_messages: Vec<Arc<Message>>,
    /// Assistant messages of this turn, empty while awaiting the reply.
    pub ai_messages: Vec<Arc<Message>>,
    /// Id of the reply this turn answers, [`ROOT_PARENT_ID`] for a first
    /// turn, or [`DETACHED_PARENT_ID`] for a detached block.
    pub parent_id: String,
    /// Position among the blocks sharing `parent_id`.
    pub branch_index: usize,
    /// Number of blocks sharing `parent_id`.
    pub branch_count: usize,
}

impl ConversationBlock {
    /// Returns `true` if this block has no user text.
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.user_message.is_none()
    }

    /// Returns the id of the last assistant message, which is what the
    /// children of this block refer to as their parent.
    #[inline]
    pub fn reply_id(&self) -> Option<&str> {
        self.ai_messages.last().and_then(|msg| msg.message_id())
    }

    /// Returns `true` if no assistant message has arrived yet.
    #[inline]
    pub fn is_awaiting_reply(&self) -> bool {
        self.ai_messages.is_empty()
    }
}

/// The sibling picked at each fork of the tree, keyed by parent id.
///
/// Forks without an entry fall back to the newest sibling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BranchSelection(HashMap<String, usize>);

impl BranchSelection {
    /// Creates an empty selection.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sibling index selected under `parent_id`.
    #[inline]
    pub fn get(&self, parent_id: &str) -> Option<usize> {
        self.0.get(parent_id).copied()
    }

    /// Selects the sibling at `index` under `parent_id`.
    #[inline]
    pub fn select<S: Into<String>>(&mut self, parent_id: S, index: usize) {
        self.0.insert(parent_id.into(), index);
    }

    /// Moves the choice under `parent_id` by `delta` among `count`
    /// siblings, stopping at either end. A fork without an entry starts
    /// from the newest sibling.
    ///
    /// Returns `false` if the choice didn't change.
    pub fn step(
        &mut self,
        parent_id: &str,
        delta: isize,
        count: usize,
    ) -> bool {
        let Some(last) = count.checked_sub(1) else {
            return false;
        };
        let current = self.get(parent_id).map_or(last, |i| i.min(last));
        let target = current.saturating_add_signed(delta).min(last);
        if target == current {
            return false;
        }
        self.select(parent_id, target);
        true
    }

    /// Returns the number of forks with an explicit choice.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no fork has an explicit choice.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Blocks of a conversation together with an index over their
/// parent/child relationships.
///
/// The index is built once per rebuild, so walking the tree costs time
/// proportional to its depth.
#[derive(Clone, Debug, Default)]
pub struct ConversationTree {
    blocks: Vec<Arc<ConversationBlock>>,
    index: Arc<TreeIndex>,
}

#[derive(Debug, Default)]
struct TreeIndex {
    // Attached blocks grouped by parent id, ordered by branch index.
    children: HashMap<String, Vec<usize>>,
    // Reply id to block. The first block with a given reply id wins.
    replies: HashMap<String, usize>,
    reachable: Vec<bool>,
}

impl TreeIndex {
    fn mark_reachable(&mut self, blocks: &[Arc<ConversationBlock>]) {
        let mut pending: Vec<usize> = self
            .children
            .get(ROOT_PARENT_ID)
            .cloned()
            .unwrap_or_default();
        while let Some(idx) = pending.pop() {
            if self.reachable[idx] {
                continue;
            }
            self.reachable[idx] = true;
            let Some(reply_id) = blocks[idx].reply_id() else {
                continue;
            };
            if let Some(children) = self.children.get(reply_id) {
                pending.extend(children);
            }
        }
    }
}

impl ConversationTree {
    /// Indexes a list of blocks in chronological order.
    pub fn from_blocks(blocks: Vec<Arc<ConversationBlock>>) -> Self {
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        let mut replies = HashMap::new();
        for (idx, block) in blocks.iter().enumerate() {
            if block.is_detached() {
                continue;
            }
            children
                .entry(block.parent_id.clone())
                .or_default()
                .push(idx);
            if let Some(reply_id) = block.reply_id() {
                replies.entry(reply_id.to_owned()).or_insert(idx);
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by_key(|&idx| blocks[idx].branch_index);
        }

        let mut index = TreeIndex {
            children,
            replies,
            reachable: vec![false; blocks.len()],
        };
        index.mark_reachable(&blocks);
        Self {
            blocks,
            index: Arc::new(index),
        }
    }

    /// Returns a tree with the last block replaced.
    ///
    /// The index is shared with `self` unless the reply id of the last
    /// block changed.
    pub(crate) fn with_last_block(&self, block: ConversationBlock) -> Self {
        let mut blocks = self.blocks.clone();
        let Some(last) = blocks.last_mut() else {
            return self.clone();
        };
        let same_reply = last.reply_id() == block.reply_id();
        *last = Arc::new(block);

        if !same_reply {
            // The reply id has just been assigned, children may now hang
            // off the last block.
            return Self::from_blocks(blocks);
        }
        Self {
            blocks,
            index: Arc::clone(&self.index),
        }
    }

    /// Returns all blocks in chronological order.
    #[inline]
    pub fn blocks(&self) -> &[Arc<ConversationBlock>] {
        &self.blocks
    }

    /// Returns the number of blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if there are no blocks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns `true` if the block at `idx` can be reached from the root.
    #[inline]
    pub fn is_reachable(&self, idx: usize) -> bool {
        self.index.reachable.get(idx).copied().unwrap_or(false)
    }

    /// Iterates over the attached blocks answering `parent_id`, ordered
    /// by branch index.
    pub fn siblings(
        &self,
        parent_id: &str,
    ) -> impl Iterator<Item = &Arc<ConversationBlock>> {
        self.index.children
            .get(parent_id)
            .into_iter()
            .flatten()
            .map(|&idx| &self.blocks[idx])
    }

    /// Returns the number of attached blocks answering `parent_id`.
    #[inline]
    pub fn sibling_count(&self, parent_id: &str) -> usize {
        self.index.children.get(parent_id).map_or(0, Vec::len)
    }

    /// Computes the selection that leads to the newest turn.
    ///
    /// Starting from the chronologically last block that can be reached
    /// from the root, this walks back through the parents and records the
    /// position of each visited block among its siblings.
    pub fn default_branch_selection(&self) -> BranchSelection {
        let index = &*self.index;
        let mut selection = BranchSelection::new();
        let Some(mut current) =
            (0..self.blocks.len()).rev().find(|&idx| index.reachable[idx])
        else {
            return selection;
        };

        let mut visited = vec![false; self.blocks.len()];
        loop {
            visited[current] = true;
            let block = &self.blocks[current];
            let position = index
                .children
                .get(&block.parent_id)
                .and_then(|siblings| {
                    siblings.iter().position(|&idx| idx == current)
                })
                .unwrap_or(block.branch_index);
            selection.select(block.parent_id.as_str(), position);

            let Some(&parent) = index.replies.get(&block.parent_id) else {
                break;
            };
            if visited[parent] {
                warn!("cycle detected at parent id {}", block.parent_id);
                break;
            }
            current = parent;
        }
        selection
    }

    /// Resolves the thread to display for a selection.
    ///
    /// Walking forward from the root, each step picks the selected sibling
    /// (clamped into range) or the newest one when the fork has no entry,
    /// then continues with the reply of the picked block. The walk ends
    /// at a block without a reply id.
    pub fn resolve_path(
        &self,
        selection: &BranchSelection,
    ) -> Vec<Arc<ConversationBlock>> {
        let mut path = Vec::new();
        let mut visited = vec![false; self.blocks.len()];
        let mut pointer = ROOT_PARENT_ID;

        while let Some(siblings) = self.index.children.get(pointer) {
            let last = siblings.len() - 1;
            let picked = selection.get(pointer).map_or(last, |i| i.min(last));
            let idx = siblings[picked];
            if visited[idx] {
                warn!("cycle detected at parent id {pointer}");
                break;
            }
            visited[idx] = true;

            let block = &self.blocks[idx];
            path.push(Arc::clone(block));
            let Some(reply_id) = block.reply_id() else {
                break;
            };
            pointer = reply_id;
        }
        path
    }
}
