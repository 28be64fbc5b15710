use std::io::Read;
use std::path::PathBuf;

use filesync::{
    format_size, DirectoryTarget, FileRecord, FileSyncController, Notifier, UploadFile,
};

use crate::error::AppError;

/// Prints notifications on stderr so that stdout stays scriptable.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn report_success(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn report_error(&self, message: &str) {
        eprintln!("error: {}", message);
    }
}

/// Find a record by exact id, then by display name.
pub fn find_record<'a>(
    files: &'a [FileRecord],
    query: &str,
) -> Result<&'a FileRecord, AppError> {
    if let Some(record) = files.iter().find(|r| r.id.to_string() == query) {
        return Ok(record);
    }
    let named: Vec<&FileRecord> = files.iter().filter(|r| r.display_name == query).collect();
    match named.as_slice() {
        [] => Err(AppError::FileNotFound(query.to_owned())),
        [record] => Ok(record),
        several => Err(AppError::AmbiguousFile(
            query.to_owned(),
            several
                .iter()
                .map(|r| r.id.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        )),
    }
}

async fn resolve(controller: &FileSyncController, query: &str) -> Result<FileRecord, AppError> {
    let files = controller.reload().await?;
    find_record(&files, query).cloned()
}

pub async fn list(controller: &FileSyncController) -> Result<(), AppError> {
    let files = controller.reload().await?;
    if files.is_empty() {
        println!("No files uploaded yet");
        return Ok(());
    }
    for record in files.iter() {
        println!(
            "{}  {:>10}  {}  {}",
            record.id,
            format_size(record.size_bytes),
            record.created_at.format("%b %-d, %Y"),
            record.display_name
        );
    }
    Ok(())
}

pub async fn upload(
    controller: &FileSyncController,
    paths: &[PathBuf],
) -> Result<(), AppError> {
    let mut selection = paths
        .iter()
        .map(UploadFile::from_path)
        .collect::<Result<Vec<_>, _>>()?;
    let ids = controller.upload(&mut selection).await?;
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

pub async fn download(
    controller: &FileSyncController,
    query: &str,
    dir: PathBuf,
) -> Result<(), AppError> {
    let record = resolve(controller, query).await?;
    let saved = controller
        .download(&record, &DirectoryTarget::new(dir))
        .await?;
    println!("{}", saved.display());
    Ok(())
}

pub async fn cat(controller: &FileSyncController, query: &str) -> Result<(), AppError> {
    let record = resolve(controller, query).await?;
    let editor = controller.open_editor(&record).await?;
    print!("{}", editor.content());
    Ok(())
}

pub async fn edit(
    controller: &FileSyncController,
    query: &str,
    from: Option<PathBuf>,
) -> Result<(), AppError> {
    let record = resolve(controller, query).await?;
    let mut editor = Some(controller.open_editor(&record).await?);

    let content = match from {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if let Some(session) = editor.as_mut() {
        session.set_content(content);
        if !session.is_dirty() {
            log::info!("{} is unchanged", record.display_name);
            return Ok(());
        }
    }
    controller.save_edits(&mut editor).await?;
    Ok(())
}

pub async fn delete(controller: &FileSyncController, query: &str) -> Result<(), AppError> {
    let record = resolve(controller, query).await?;
    controller.delete(&record).await?;
    Ok(())
}

pub async fn reconcile(controller: &FileSyncController, purge: bool) -> Result<(), AppError> {
    let report = controller.reconcile().await?;
    if report.is_clean() {
        println!("Both stores agree");
        return Ok(());
    }
    for key in &report.orphaned_blobs {
        println!("orphaned blob    {}", key);
    }
    for record in &report.dangling_records {
        println!("dangling record  {}  {}", record.id, record.display_name);
    }
    if purge {
        let removed = controller.purge(&report).await?;
        println!("{} items removed", removed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use filesync::{BlobKey, FileId, OwnerId};

    fn record(name: &str) -> FileRecord {
        let owner = OwnerId::new("alice");
        FileRecord {
            id: FileId::new(),
            blob_key: BlobKey::generate(&owner, name),
            owner_id: owner,
            display_name: name.to_owned(),
            size_bytes: 0,
            content_type: "text/plain".to_owned(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn records_are_found_by_id_or_name() {
        let files = vec![record("a.txt"), record("b.txt")];

        let by_id = find_record(&files, &files[1].id.to_string()).unwrap();
        assert_eq!(by_id.display_name, "b.txt");
        let by_name = find_record(&files, "a.txt").unwrap();
        assert_eq!(by_name.id, files[0].id);
        assert!(matches!(
            find_record(&files, "c.txt"),
            Err(AppError::FileNotFound(_))
        ));
    }

    #[test]
    fn duplicate_names_need_an_id() {
        let files = vec![record("same.txt"), record("same.txt")];

        match find_record(&files, "same.txt") {
            Err(AppError::AmbiguousFile(_, ids)) => {
                assert!(ids.contains(&files[0].id.to_string()));
                assert!(ids.contains(&files[1].id.to_string()));
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.id)),
        }
    }
}
