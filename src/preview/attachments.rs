//! Writing decoded attachments to the preview directory

use crate::mime::Attachment;
use crate::preview::error::PreviewError;
use crate::preview::unique_id;

use log::info;
use std::fs;
use std::path::Path;

/// Longest attachment name, in characters, used to build a file name
pub const MAX_NAME_CHARS: usize = 50;

/// Write every attachment into `dir` and record where it went.
///
/// Stops at the first attachment whose extension cannot be resolved or whose
/// file cannot be written. Files from earlier runs are never overwritten or
/// removed.
pub fn save_attachments(dir: &Path, attachments: &mut [Attachment]) -> Result<(), PreviewError> {
    for attachment in attachments.iter_mut() {
        let path = dir.join(file_name(attachment)?);
        fs::write(&path, &attachment.data).map_err(|source| PreviewError::Write {
            path: path.clone(),
            source,
        })?;

        info!(
            "Saved attachment {:?} ({} bytes) to {}",
            attachment.name,
            attachment.data.len(),
            path.display()
        );
        attachment.path = Some(path);
    }

    Ok(())
}

/// `<truncated name><random id>.<extension>`
fn file_name(attachment: &Attachment) -> Result<String, PreviewError> {
    let extension = extension_for(&attachment.content_type)?;
    let stem: String = attachment
        .name
        .chars()
        .take(MAX_NAME_CHARS)
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    Ok(format!("{stem}{}.{extension}", unique_id()))
}

/// Preferred file extension for a MIME type
pub fn extension_for(content_type: &str) -> Result<&'static str, PreviewError> {
    mime_guess::get_mime_extensions_str(content_type)
        .and_then(|extensions| extensions.first().copied())
        .ok_or_else(|| PreviewError::UnknownExtension(content_type.to_owned()))
}
