//! anatomy-meta - 解剖3Dアセットカタログ整備ツール
//!
//! カタログ（meta.json）の分類をキーワード・フレーズのスコアで推定し、
//! 修正候補の生成・適用・レビューループを提供する。

pub mod assets;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod fixes;
pub mod report;
pub mod review;
pub mod scorer;

pub use anatomy_meta_common as common;
