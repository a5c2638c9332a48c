//! CSVテーブルの読み書き
//!
//! レポート・Fix表はすべてヘッダー付きCSV。
//! Excelから書き出したセミコロン区切りも読めるようにする。

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// ヘッダー付きのテーブル
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// 1行分のビュー（列名でアクセス）
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a HashMap<String, usize>,
    row: &'a [String],
}

impl<'a> Record<'a> {
    /// 列の値（列がない・値がない場合は空文字）
    pub fn get(&self, column: &str) -> &'a str {
        self.columns
            .get(column)
            .and_then(|&i| self.row.get(i))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// 区切り文字を自動判定して読み込む（`,` で1列しか取れなければ `;`）
    pub fn parse(content: &str) -> Self {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let table = Self::parse_with(content, ',');
        let first_line = content.lines().next().unwrap_or("");
        if table.headers.len() <= 1 && first_line.contains(';') {
            return Self::parse_with(content, ';');
        }
        table
    }

    /// 指定した区切り文字で読み込む
    pub fn parse_with(content: &str, delimiter: char) -> Self {
        let mut records = parse_records(content, delimiter).into_iter();
        let headers = records
            .next()
            .map(|h| h.into_iter().map(|c| c.trim().to_string()).collect())
            .unwrap_or_default();
        Self {
            headers,
            rows: records.collect(),
        }
    }

    /// ファイルから読み込み
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// 必須列の確認
    pub fn require(&self, table: &str, columns: &[&str]) -> Result<()> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingColumns {
                table: table.to_string(),
                missing,
            })
        }
    }

    /// 列名アクセス付きで各行を処理する
    pub fn for_each_record<F>(&self, mut f: F)
    where
        F: FnMut(Record<'_>),
    {
        let columns = self.column_index();
        for row in &self.rows {
            f(Record { columns: &columns, row });
        }
    }

    /// 各行を変換して集める
    pub fn map_records<T, F>(&self, mut f: F) -> Vec<T>
    where
        F: FnMut(Record<'_>) -> T,
    {
        let mut out = Vec::with_capacity(self.rows.len());
        self.for_each_record(|r| out.push(f(r)));
        out
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.headers.len() {
            return Err(Error::Table(format!(
                "row has {} fields, expected {}",
                row.len(),
                self.headers.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// CSV文字列に変換（カンマ区切り、必要な箇所のみクォート）
    pub fn to_csv_string(&self) -> String {
        let mut out = String::new();
        write_line(&mut out, &self.headers);
        for row in &self.rows {
            write_line(&mut out, row);
        }
        out
    }

    /// CSVファイルに書き出す（親ディレクトリも作成）
    pub fn write_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_csv_string())?;
        Ok(())
    }

    fn column_index(&self) -> HashMap<String, usize> {
        let mut index = HashMap::new();
        for (i, h) in self.headers.iter().enumerate() {
            index.entry(h.clone()).or_insert(i);
        }
        index
    }
}

/// 数値列を読む（小数点カンマも許容）
pub fn parse_decimal(value: &str) -> Option<f64> {
    let v = value.trim().replace(',', ".");
    if v.is_empty() {
        return None;
    }
    v.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// 真偽フラグ列を読む
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "wahr" | "1" | "yes" | "ja"
    )
}

fn parse_records(content: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            c if c == delimiter => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        push_record(&mut records, row);
    }

    records
}

fn push_record(records: &mut Vec<Vec<String>>, row: Vec<String>) {
    // 空行は読み飛ばす
    if row.len() == 1 && row[0].trim().is_empty() {
        return;
    }
    records.push(row);
}

fn write_line(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r', ';']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}
