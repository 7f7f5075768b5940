//! Query templates, rendered once per [`Database`](crate::Database).

use crate::backend::{StorageBackend, TablePrefix, render};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Statement {
    InsertDirname,
    SelectDirname,
    InsertFilename,
    SelectFilename,
    InsertPath,
    SelectPath,
    LookupPath,
    InsertHash,
    SelectHash,
    LookupHash,
    AddRoot,
    DisableRoot,
    EnabledRoots,
    RootId,
    InsertScan,
    CompleteScan,
    LastScan,
    LastCompleteScan,
    GetScan,
    ListScans,
    CachedHash,
    AppendFile,
    CountFiles,
    AllFiles,
    NewFiles,
    ChangedFiles,
    DuplicateFiles,
    Singletons,
    FilesWithHash,
}

impl Statement {
    const ALL: [Self; 29] = [
        Self::InsertDirname,
        Self::SelectDirname,
        Self::InsertFilename,
        Self::SelectFilename,
        Self::InsertPath,
        Self::SelectPath,
        Self::LookupPath,
        Self::InsertHash,
        Self::SelectHash,
        Self::LookupHash,
        Self::AddRoot,
        Self::DisableRoot,
        Self::EnabledRoots,
        Self::RootId,
        Self::InsertScan,
        Self::CompleteScan,
        Self::LastScan,
        Self::LastCompleteScan,
        Self::GetScan,
        Self::ListScans,
        Self::CachedHash,
        Self::AppendFile,
        Self::CountFiles,
        Self::AllFiles,
        Self::NewFiles,
        Self::ChangedFiles,
        Self::DuplicateFiles,
        Self::Singletons,
        Self::FilesWithHash,
    ];

    fn template(self) -> &'static str {
        match self {
            Self::InsertDirname => include_str!("../queries/insert_dirname.sql"),
            Self::SelectDirname => include_str!("../queries/select_dirname.sql"),
            Self::InsertFilename => include_str!("../queries/insert_filename.sql"),
            Self::SelectFilename => include_str!("../queries/select_filename.sql"),
            Self::InsertPath => include_str!("../queries/insert_path.sql"),
            Self::SelectPath => include_str!("../queries/select_path.sql"),
            Self::LookupPath => include_str!("../queries/lookup_path.sql"),
            Self::InsertHash => include_str!("../queries/insert_hash.sql"),
            Self::SelectHash => include_str!("../queries/select_hash.sql"),
            Self::LookupHash => include_str!("../queries/lookup_hash.sql"),
            Self::AddRoot => include_str!("../queries/add_root.sql"),
            Self::DisableRoot => include_str!("../queries/disable_root.sql"),
            Self::EnabledRoots => include_str!("../queries/enabled_roots.sql"),
            Self::RootId => include_str!("../queries/root_id.sql"),
            Self::InsertScan => include_str!("../queries/insert_scan.sql"),
            Self::CompleteScan => include_str!("../queries/complete_scan.sql"),
            Self::LastScan => include_str!("../queries/last_scan.sql"),
            Self::LastCompleteScan => include_str!("../queries/last_complete_scan.sql"),
            Self::GetScan => include_str!("../queries/get_scan.sql"),
            Self::ListScans => include_str!("../queries/list_scans.sql"),
            Self::CachedHash => include_str!("../queries/cached_hash.sql"),
            Self::AppendFile => include_str!("../queries/append_file.sql"),
            Self::CountFiles => include_str!("../queries/count_files.sql"),
            Self::AllFiles => include_str!("../queries/all_files.sql"),
            Self::NewFiles => include_str!("../queries/new_files.sql"),
            Self::ChangedFiles => include_str!("../queries/changed_files.sql"),
            Self::DuplicateFiles => include_str!("../queries/duplicate_files.sql"),
            Self::Singletons => include_str!("../queries/singletons.sql"),
            Self::FilesWithHash => include_str!("../queries/files_with_hash.sql"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Statements {
    rendered: HashMap<Statement, String>,
}
impl Statements {
    pub(crate) fn render(backend: &dyn StorageBackend, prefix: &TablePrefix) -> Self {
        let rendered = Statement::ALL
            .into_iter()
            .map(|statement| (statement, render(backend, prefix, statement.template())))
            .collect();
        Self { rendered }
    }

    pub(crate) fn get(&self, statement: Statement) -> &str {
        // Every variant is rendered up front.
        self.rendered.get(&statement).map(String::as_str).unwrap_or_default()
    }
}
