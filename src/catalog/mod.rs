//! カタログ（meta.json）の読み書きと整備
//!
//! - store: 読み込み・バックアップ・アトミック書き込み
//! - uid: entry_uid の付与とキー検証
//! - upgrade: スキーマ 1.2 への非破壊アップグレード

pub mod store;
pub mod uid;
pub mod upgrade;

pub use store::{backup_catalog, backup_path_for, load_catalog, save_with_backup, write_catalog_atomic};
pub use uid::{assign_uids, validate_keys, ValidationReport};
pub use upgrade::{upgrade_catalog, upgrade_entry};
