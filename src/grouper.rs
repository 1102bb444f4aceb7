use crate::attachments::Materializer;
use crate::importer::MessageRow;
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// All note lines produced by messages sent in the same second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedEntry {
    pub timestamp: NaiveDateTime,
    pub lines: Vec<String>,
}

/// Merge rows by exact timestamp, keeping first-seen order of timestamps.
///
/// Text comes before the attachment line of the same row. A timestamp whose rows
/// carry neither text nor attachment still yields an entry, with no lines.
pub fn group_rows<I>(rows: I, materializer: &mut Materializer<'_>) -> Vec<GroupedEntry>
where
    I: IntoIterator<Item = MessageRow>,
{
    let mut entries: Vec<GroupedEntry> = Vec::new();
    let mut index: HashMap<NaiveDateTime, usize> = HashMap::new();

    for row in rows {
        let slot = *index.entry(row.timestamp).or_insert_with(|| {
            entries.push(GroupedEntry {
                timestamp: row.timestamp,
                lines: Vec::new(),
            });
            entries.len() - 1
        });

        if let Some(text) = row.text.as_deref().filter(|t| !t.is_empty()) {
            entries[slot].lines.push(text.to_string());
        }
        if let Some(attachment) = &row.attachment {
            let line = materializer.materialize(attachment);
            entries[slot].lines.push(line);
        }
        tracing::debug!(
            timestamp = %row.timestamp,
            sender = %row.sender,
            lines = entries[slot].lines.len(),
            "grouped row"
        );
    }

    entries
}
