use std::fmt::Write as _;
use std::sync::Arc;

use layra_core::tree::ConversationBlock;
use layra_model::{Message, MessageKind};

/// Renders a thread as plain text, one numbered entry per turn.
///
/// Turns with siblings show their position as `[index/count]`, so the
/// turn number can be passed to the branch switching commands.
pub fn render_path(path: &[Arc<ConversationBlock>]) -> String {
    let mut out = String::new();
    for (idx, block) in path.iter().enumerate() {
        let _ = write!(out, "{}.", idx + 1);
        if block.branch_count > 1 {
            let _ = write!(
                out,
                " [{}/{}]",
                block.branch_index + 1,
                block.branch_count
            );
        }
        let text = block
            .user_message
            .as_ref()
            .map_or("", |msg| msg.content.as_str());
        let _ = writeln!(out, " You: {text}");

        for msg in &block.other_user_messages {
            let _ = writeln!(out, "   attached: {}", file_name(msg));
        }
        for msg in &block.ai_messages {
            render_reply(&mut out, msg);
        }
    }
    out
}

fn render_reply(out: &mut String, msg: &Message) {
    match msg.kind {
        MessageKind::BaseFile => {
            let score = msg.citation.as_ref().map_or(0.0, |c| c.score);
            let _ = writeln!(out, "   cited: {} ({score})", file_name(msg));
        }
        _ => {
            if let Some(thinking) = msg.thinking.as_deref() {
                if msg.content.is_empty() {
                    let _ = writeln!(out, "   AI (thinking): {thinking}");
                    return;
                }
            }
            let _ = write!(out, "   AI: {}", msg.content);
            match msg.usage {
                Some(usage) if usage.total_tokens > 0 => {
                    let _ = writeln!(out, " [{} tokens]", usage.total_tokens);
                }
                _ => out.push('\n'),
            }
        }
    }
}

#[inline]
fn file_name(msg: &Message) -> &str {
    msg.file_name.as_deref().unwrap_or(&msg.content)
}
