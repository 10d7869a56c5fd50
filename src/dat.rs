use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;
use tempfile::NamedTempFile;
use zip::ZipArchive;

use crate::checksum::is_md5_hex;
use crate::error::OrganizeError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub name: String,
    pub md5: String,
}

/// Known-good dumps keyed by lowercase MD5.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceDb {
    source: PathBuf,
    entries: HashMap<String, ReferenceEntry>,
}

impl ReferenceDb {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            entries: HashMap::new(),
        }
    }

    /// Later entries replace earlier ones with the same checksum.
    pub fn insert(&mut self, name: impl Into<String>, md5: &str) {
        let md5 = md5.to_ascii_lowercase();
        self.entries.insert(
            md5.clone(),
            ReferenceEntry {
                name: name.into(),
                md5,
            },
        );
    }

    pub fn get(&self, md5: &str) -> Option<&ReferenceEntry> {
        self.entries.get(&md5.to_ascii_lowercase())
    }

    pub fn contains(&self, md5: &str) -> bool {
        self.get(md5).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatFormat {
    Logiqx,
    ClrMamePro,
    Md5List,
}

struct ParsedDat {
    entries: Vec<(String, String)>,
    without_md5: usize,
}

pub fn load_reference_db(path: &Path, verbose: u8) -> Result<ReferenceDb, OrganizeError> {
    if is_zip_path(path) {
        // The extracted copy lives until the end of this block, whatever the outcome.
        let (extracted, entry_name) = extract_dat_from_zip(path)?;
        vprintln!(
            verbose,
            2,
            "extracted {} from {} to {}",
            entry_name,
            path.display(),
            extracted.path().display()
        );
        let text = read_text(extracted.path()).map_err(|e| {
            OrganizeError::reference(path, format!("reading extracted {entry_name}: {e}"))
        })?;
        return parse_reference_text(&text, path, verbose).map_err(|err| match err {
            OrganizeError::ReferenceData { path, reason } => OrganizeError::ReferenceData {
                path,
                reason: format!("{entry_name}: {reason}"),
            },
            other => other,
        });
    }

    let text = read_text(path)
        .map_err(|e| OrganizeError::reference(path, format!("cannot read file: {e}")))?;
    parse_reference_text(&text, path, verbose)
}

/// Parse a DAT that is already in memory. `origin` is only used for
/// messages and `ReferenceDb::source`.
pub fn parse_reference_text(
    text: &str,
    origin: &Path,
    verbose: u8,
) -> Result<ReferenceDb, OrganizeError> {
    let text = text.trim_start_matches('\u{feff}');
    let format = detect_format(text);
    let parsed = match format {
        DatFormat::Logiqx => parse_logiqx(text),
        DatFormat::ClrMamePro => parse_clrmamepro(text),
        DatFormat::Md5List => parse_md5_list(text),
    }
    .map_err(|reason| OrganizeError::reference(origin, reason))?;

    if parsed.entries.is_empty() {
        return Err(OrganizeError::reference(
            origin,
            format!(
                "no ROM entries with an MD5 checksum ({} without one)",
                parsed.without_md5
            ),
        ));
    }

    let mut db = ReferenceDb::new(origin);
    let listed = parsed.entries.len();
    for (name, md5) in parsed.entries {
        db.insert(name, &md5);
    }

    vprintln!(
        verbose,
        1,
        "loaded {} MD5 entries from {} ({:?}, {} listed, {} without MD5)",
        db.len(),
        origin.display(),
        format,
        listed,
        parsed.without_md5
    );

    Ok(db)
}

pub fn detect_format(text: &str) -> DatFormat {
    let trimmed = text.trim_start();
    if trimmed.starts_with('<') {
        return DatFormat::Logiqx;
    }

    let first_line = trimmed
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with(';'));
    match first_line.and_then(|l| l.split_whitespace().next()) {
        Some(word) if is_md5_hex(word) => DatFormat::Md5List,
        _ => DatFormat::ClrMamePro,
    }
}

fn is_zip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn read_text(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_dat_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !lower.ends_with('/') && (lower.ends_with(".dat") || lower.ends_with(".xml"))
}

fn extract_dat_from_zip(path: &Path) -> Result<(NamedTempFile, String), OrganizeError> {
    let file = File::open(path)
        .map_err(|e| OrganizeError::reference(path, format!("cannot open archive: {e}")))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| OrganizeError::reference(path, format!("not a readable zip archive: {e}")))?;

    let dat_names: Vec<String> = archive
        .file_names()
        .filter(|name| is_dat_entry(name))
        .map(String::from)
        .collect();
    let entry_name = match dat_names.as_slice() {
        [single] => single.clone(),
        [] => {
            return Err(OrganizeError::reference(
                path,
                "archive contains no .dat or .xml file",
            ));
        }
        many => {
            return Err(OrganizeError::reference(
                path,
                format!(
                    "archive contains {} .dat/.xml files, expected exactly one: {}",
                    many.len(),
                    many.join(", ")
                ),
            ));
        }
    };

    let mut entry = archive
        .by_name(&entry_name)
        .map_err(|e| OrganizeError::reference(path, format!("reading {entry_name}: {e}")))?;
    let mut extracted = tempfile::Builder::new()
        .prefix("rom-organizer-")
        .suffix(".dat")
        .tempfile()
        .map_err(|e| OrganizeError::reference(path, format!("creating temporary file: {e}")))?;
    io::copy(&mut entry, extracted.as_file_mut())
        .map_err(|e| OrganizeError::reference(path, format!("extracting {entry_name}: {e}")))?;

    Ok((extracted, entry_name))
}

fn line_at(text: &str, byte_pos: usize) -> usize {
    let end = byte_pos.min(text.len());
    text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

fn check_md5(value: &str, rom: &str, line: usize) -> Result<String, String> {
    if is_md5_hex(value) {
        Ok(value.to_ascii_lowercase())
    } else {
        Err(format!("line {line}: rom \"{rom}\" has invalid md5 \"{value}\""))
    }
}

fn parse_logiqx(text: &str) -> Result<ParsedDat, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut parsed = ParsedDat {
        entries: Vec::new(),
        without_md5: 0,
    };
    let mut current_game: Option<String> = None;

    fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, String> {
        for attr in e.attributes() {
            let attr = attr.map_err(|err| format!("malformed attribute: {err}"))?;
            if attr.key.as_ref().eq_ignore_ascii_case(key) {
                let value = attr
                    .unescape_value()
                    .map_err(|err| format!("malformed attribute value: {err}"))?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e))
                if e.name().as_ref() == b"game" || e.name().as_ref() == b"machine" =>
            {
                current_game = attr_value(e, b"name").map_err(|err| {
                    format!(
                        "line {}: {err}",
                        line_at(text, reader.buffer_position() as usize)
                    )
                })?;
            }
            Ok(Event::End(ref e))
                if e.name().as_ref() == b"game" || e.name().as_ref() == b"machine" =>
            {
                current_game = None;
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.name().as_ref() == b"rom" => {
                // The reader sits just past the tag, which is on the tag's last line.
                let line = line_at(text, reader.buffer_position() as usize);
                let in_line = |err: String| format!("line {line}: {err}");
                let name = attr_value(e, b"name")
                    .map_err(in_line)?
                    .or_else(|| current_game.clone())
                    .unwrap_or_default();
                match attr_value(e, b"md5").map_err(in_line)? {
                    Some(md5) => {
                        let md5 = check_md5(md5.trim(), &name, line)?;
                        parsed.entries.push((name, md5));
                    }
                    None => parsed.without_md5 += 1,
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(format!(
                    "line {}: invalid XML: {err}",
                    line_at(text, reader.buffer_position() as usize)
                ));
            }
        }
    }

    Ok(parsed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Word(String),
}

fn tokenize_clrmamepro(text: &str) -> Result<Vec<(Token, usize)>, String> {
    let mut tokens = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        let mut chars = raw_line.chars().peekable();
        while let Some(&c) = chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    chars.next();
                }
                '(' => {
                    chars.next();
                    tokens.push((Token::Open, line));
                }
                ')' => {
                    chars.next();
                    tokens.push((Token::Close, line));
                }
                '"' => {
                    chars.next();
                    let mut value = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '"' {
                            closed = true;
                            break;
                        }
                        value.push(c);
                    }
                    if !closed {
                        return Err(format!("line {line}: unterminated string"));
                    }
                    tokens.push((Token::Word(value), line));
                }
                _ => {
                    let mut value = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                            break;
                        }
                        value.push(c);
                        chars.next();
                    }
                    tokens.push((Token::Word(value), line));
                }
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug)]
enum Node {
    Value(String),
    Block(Vec<(String, Node, usize)>),
}

struct TokenStream {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl TokenStream {
    fn next(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        item
    }

    /// Parse the body of a block whose `(` has already been consumed.
    fn block(&mut self, opened_at: usize) -> Result<Vec<(String, Node, usize)>, String> {
        let mut items = Vec::new();
        loop {
            match self.next() {
                Some((Token::Close, _)) => return Ok(items),
                Some((Token::Word(key), line)) => match self.next() {
                    Some((Token::Open, _)) => {
                        let nested = self.block(line)?;
                        items.push((key, Node::Block(nested), line));
                    }
                    Some((Token::Word(value), _)) => items.push((key, Node::Value(value), line)),
                    _ => return Err(format!("line {line}: \"{key}\" has no value")),
                },
                Some((Token::Open, line)) => {
                    return Err(format!("line {line}: unexpected \"(\""));
                }
                None => {
                    return Err(format!(
                        "unbalanced parentheses: block opened on line {opened_at} is never closed"
                    ));
                }
            }
        }
    }
}

fn value_of<'a>(items: &'a [(String, Node, usize)], key: &str) -> Option<&'a str> {
    items.iter().find_map(|(k, node, _)| match node {
        Node::Value(v) if k.eq_ignore_ascii_case(key) => Some(v.as_str()),
        _ => None,
    })
}

fn parse_clrmamepro(text: &str) -> Result<ParsedDat, String> {
    let mut stream = TokenStream {
        tokens: tokenize_clrmamepro(text)?,
        pos: 0,
    };
    let mut parsed = ParsedDat {
        entries: Vec::new(),
        without_md5: 0,
    };

    while let Some((token, line)) = stream.next() {
        let kind = match token {
            Token::Word(word) => word,
            Token::Close => return Err(format!("line {line}: unexpected \")\"")),
            Token::Open => return Err(format!("line {line}: \"(\" without a block name")),
        };
        match stream.next() {
            Some((Token::Open, _)) => {}
            _ => return Err(format!("line {line}: expected \"(\" after \"{kind}\"")),
        }
        let items = stream.block(line)?;

        if !matches!(
            kind.to_ascii_lowercase().as_str(),
            "game" | "machine" | "resource"
        ) {
            continue;
        }

        let game_name = value_of(&items, "name").unwrap_or_default();
        for (key, node, rom_line) in &items {
            let Node::Block(rom) = node else { continue };
            if !key.eq_ignore_ascii_case("rom") {
                continue;
            }
            let name = value_of(rom, "name").unwrap_or(game_name).to_string();
            match value_of(rom, "md5") {
                Some(md5) => {
                    let md5 = check_md5(md5, &name, *rom_line)?;
                    parsed.entries.push((name, md5));
                }
                None => parsed.without_md5 += 1,
            }
        }
    }

    Ok(parsed)
}

fn parse_md5_list(text: &str) -> Result<ParsedDat, String> {
    let mut parsed = ParsedDat {
        entries: Vec::new(),
        without_md5: 0,
    };

    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let (hash, rest) = trimmed
            .split_once(char::is_whitespace)
            .ok_or_else(|| format!("line {line}: expected \"<md5> <name>\""))?;
        let name = rest.trim_start().trim_start_matches('*').trim();
        if name.is_empty() {
            return Err(format!("line {line}: missing name after checksum"));
        }
        let md5 = check_md5(hash, name, line)?;
        parsed.entries.push((name.to_string(), md5));
    }

    Ok(parsed)
}
