//! Conversion of stored history turns into a flat message list.

use std::sync::Arc;

use layra_model::{HistoryTurn, Message, ROOT_PARENT_ID};

/// Expands history turns into the flat message list the tree is built
/// from.
///
/// Each turn becomes, in this order: its image attachments, its other
/// attachments, the user text, the assistant answer, and one message per
/// cited knowledge base file.
pub fn expand_history(turns: &[HistoryTurn]) -> Vec<Arc<Message>> {
    let mut messages = Vec::new();
    for turn in turns {
        expand_turn(turn, &mut messages);
    }
    messages
}

fn expand_turn(turn: &HistoryTurn, messages: &mut Vec<Arc<Message>>) {
    let parent = if turn.parent_message_id.is_empty() {
        ROOT_PARENT_ID
    } else {
        turn.parent_message_id.as_str()
    };

    let (images, files): (Vec<_>, Vec<_>) =
        turn.user_files.iter().partition(|file| file.is_image());
    messages.extend(
        images
            .into_iter()
            .chain(files)
            .map(|file| Arc::new(Message::attachment(file))),
    );

    messages.push(Arc::new(
        Message::user_text(turn.user_text.as_str()).with_parent(parent),
    ));
    messages.push(Arc::new(
        Message::ai_text(turn.ai_text.as_str())
            .with_message_id(turn.message_id.as_str())
            .with_parent(parent)
            .with_usage(turn.usage),
    ));

    messages.extend(turn.files_used.iter().enumerate().map(|(idx, file)| {
        Arc::new(
            Message::citation(idx, file.clone())
                .with_message_id(turn.message_id.as_str()),
        )
    }));
}
