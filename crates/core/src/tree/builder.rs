use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use layra_model::{Message, MessageKind};

use super::{ConversationBlock, ConversationTree, DETACHED_PARENT_ID};

/// Builds the conversation tree for the current message list.
///
/// `previous` is the result of the last call and `previous_len` the length
/// of the message list it was built from. While a reply is streaming,
/// the controller replaces the trailing assistant message in place, so an
/// unchanged length means only the reply of the last turn may differ. In
/// that case only the last block is rebuilt and every other block is
/// shared with `previous`. If the last turn of `previous` doesn't belong
/// to the last user message, `previous` is returned as is.
///
/// Any other call rebuilds the whole tree. This function never fails,
/// malformed input ends up in detached blocks.
pub fn build_blocks(
    raw: &[Arc<Message>],
    previous: &ConversationTree,
    previous_len: usize,
    is_streaming: bool,
) -> ConversationTree {
    if is_streaming
        && raw.len() == previous_len
        && !previous.is_empty()
        && !raw.is_empty()
    {
        return update_last_block(raw, previous);
    }
    rebuild(raw)
}

fn update_last_block(
    raw: &[Arc<Message>],
    previous: &ConversationTree,
) -> ConversationTree {
    let Some(user_pos) = raw.iter().rposition(|msg| msg.is_user()) else {
        trace!("no user message while streaming");
        return previous.clone();
    };
    let Some(last_block) = previous.blocks().last() else {
        return previous.clone();
    };

    let last_user = &raw[user_pos];
    let is_same_turn = last_block
        .user_message
        .as_ref()
        .is_some_and(|msg| msg.message_id() == last_user.message_id());
    if !is_same_turn {
        debug!("last block doesn't match the streaming turn, skipped");
        return previous.clone();
    }

    trace!("updating the reply of the last block");
    previous.with_last_block(ConversationBlock {
        user_message: last_block.user_message.clone(),
        other_user_messages: last_block.other_user_messages.clone(),
        ai_messages: raw[user_pos + 1..].to_vec(),
        parent_id: last_block.parent_id.clone(),
        branch_index: last_block.branch_index,
        branch_count: last_block.branch_count,
    })
}

/// Messages collected for one turn.
#[derive(Default)]
struct Turn {
    // The text message and its position in the message list.
    user: Option<(usize, Arc<Message>)>,
    attachments: Vec<Arc<Message>>,
    replies: Vec<Arc<Message>>,
}

impl Turn {
    #[inline]
    fn is_empty(&self) -> bool {
        self.user.is_none()
            && self.attachments.is_empty()
            && self.replies.is_empty()
    }

    fn into_block(self) -> (Option<usize>, ConversationBlock) {
        let (position, user_message) = match self.user {
            Some((position, msg)) => (Some(position), Some(msg)),
            None => {
                warn!(
                    "detached {} attachment(s) and {} reply message(s)",
                    self.attachments.len(),
                    self.replies.len()
                );
                (None, None)
            }
        };
        let parent_id = user_message
            .as_ref()
            .map_or(DETACHED_PARENT_ID, |msg| msg.parent_id())
            .to_owned();
        let block = ConversationBlock {
            user_message,
            other_user_messages: self.attachments,
            ai_messages: self.replies,
            parent_id,
            branch_index: 0,
            branch_count: 1,
        };
        (position, block)
    }
}

fn rebuild(raw: &[Arc<Message>]) -> ConversationTree {
    let (mut turns, current) = raw.iter().enumerate().fold(
        (Vec::new(), Turn::default()),
        |(mut turns, mut current), (pos, msg)| {
            if !msg.is_user() {
                current.replies.push(Arc::clone(msg));
                return (turns, current);
            }

            // A user message always closes the replies of the open turn.
            if current.user.is_some() {
                turns.push(mem::take(&mut current));
            } else if !current.replies.is_empty() {
                // Replies without user text. Pending attachments still
                // belong to the next user text.
                turns.push(Turn {
                    replies: mem::take(&mut current.replies),
                    ..Default::default()
                });
            }

            if msg.kind == MessageKind::Text {
                current.user = Some((pos, Arc::clone(msg)));
            } else {
                current.attachments.push(Arc::clone(msg));
            }
            (turns, current)
        },
    );
    if !current.is_empty() {
        turns.push(current);
    }

    let (positions, mut blocks): (Vec<_>, Vec<_>) =
        turns.into_iter().map(Turn::into_block).unzip();
    assign_branches(&mut blocks, &positions);

    debug!("rebuilt {} block(s) from {} message(s)", blocks.len(), raw.len());
    ConversationTree::from_blocks(blocks.into_iter().map(Arc::new).collect())
}

/// Numbers the siblings of each parent by the position of their user text.
///
/// Detached blocks share their own group and keep chronological order.
fn assign_branches(
    blocks: &mut [ConversationBlock],
    positions: &[Option<usize>],
) {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, block) in blocks.iter().enumerate() {
        groups.entry(block.parent_id.as_str()).or_default().push(idx);
    }
    let groups: Vec<Vec<usize>> = groups
        .into_values()
        .map(|mut siblings| {
            // Stable, so equal positions keep their order.
            siblings.sort_by_key(|&idx| positions[idx]);
            siblings
        })
        .collect();

    for siblings in groups {
        let branch_count = siblings.len();
        for (branch_index, idx) in siblings.into_iter().enumerate() {
            blocks[idx].branch_index = branch_index;
            blocks[idx].branch_count = branch_count;
        }
    }
}
