use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

use crate::error::{CalltraceError, Result};
use super::super::source_unit::{unit_key, Corpus, SourceUnit};
use super::{
    LanguageAnalyzer, LocalBinding, LocalIndex, TypeHint, TypeKey, TypeKind, TypeRecord, TypeTable,
};

const THIRD_PARTY_DIR: &str = "vendor";

/// Chained-assignment tracing stops here (`a := b; b := c; ...`).
const MAX_CHAIN_DEPTH: usize = 8;

const PRIMITIVES: &[&str] = &[
    "string", "bool", "byte", "rune", "error", "any", "int", "int8", "int16", "int32", "int64",
    "uint", "uint8", "uint16", "uint32", "uint64", "uintptr", "float32", "float64", "complex64",
    "complex128",
];

/// Lexical analyzer for Go sources. Everything here is pattern matching and
/// brace counting over raw text; there is no real grammar behind it, so the
/// resolution results are best-effort by design.
pub struct GoAnalyzer;

impl GoAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Declaration header: everything before the body's opening brace, or
    /// the first line for bodiless declarations.
    fn header<'a>(&self, content: &'a str) -> &'a str {
        match content.find('{') {
            Some(idx) => &content[..idx],
            None => content.lines().next().unwrap_or(""),
        }
    }

    /// Body text between the first opening brace and the last closing brace.
    fn body<'a>(&self, content: &'a str) -> Option<&'a str> {
        let open = content.find('{')?;
        let close = content.rfind('}')?;
        if close <= open {
            return None;
        }
        Some(&content[open + 1..close])
    }

    fn is_comment_line(&self, line: &str) -> bool {
        line.trim_start().starts_with("//")
    }

    /// Body with comment lines removed, so call-site regexes cannot match
    /// inside commented-out code.
    fn body_without_comments(&self, content: &str) -> Option<String> {
        let body = self.body(content)?;
        let kept: Vec<&str> = body
            .lines()
            .filter(|line| !self.is_comment_line(line))
            .collect();
        Some(kept.join("\n"))
    }

    /// Package-name candidates inferred from a raw path. Shared between
    /// function units and type records.
    fn package_names_for_path(&self, path: &str) -> Vec<String> {
        let parts: Vec<&str> = path.split('/').collect();

        // Trailing major-version suffix (`vN`) sits in the 5th segment of
        // vendored module paths like vendor/host/org/repo/v2/file.go.
        let mut version = String::new();
        if parts.len() > 4 && is_version_segment(parts[4]) {
            version = format!("/{}", parts[4]);
        }

        let mut names = Vec::new();
        if parts[0].starts_with(THIRD_PARTY_DIR) {
            if parts.len() > 2 {
                names.push(format!("{}/{}{}", parts[1], parts[2], version));
            }
            if parts.len() > 3 {
                names.push(format!("{}/{}/{}{}", parts[1], parts[2], parts[3], version));
            }
        } else {
            if parts.len() > 1 {
                names.push(format!("{}/{}{}", parts[0], parts[1], version));
            }
            if parts.len() > 2 {
                names.push(format!("{}/{}/{}{}", parts[0], parts[1], parts[2], version));
            }
            if names.is_empty() {
                names.push(parts[0].to_string());
            }
        }
        names
    }

    /// The `package X` declaration of a file, when present.
    fn package_decl_name(&self, file_text: &str) -> Option<String> {
        for line in file_text.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("package ") {
                let name = rest.split_whitespace().next()?;
                return Some(name.to_string());
            }
        }
        None
    }

    /// Resolve an import qualifier to its import path. Handles both the
    /// parenthesized import block and single-line imports, by alias when one
    /// is present, else by the path's trailing segment.
    fn import_path_for_qualifier(&self, file_text: &str, qualifier: &str) -> Option<String> {
        let mut in_block = false;
        for line in file_text.lines() {
            let trimmed = line.trim();
            if in_block {
                if trimmed.starts_with(')') {
                    in_block = false;
                    continue;
                }
                if let Some(path) = import_entry_matches(trimmed, qualifier) {
                    return Some(path);
                }
            } else if trimmed.starts_with("import (") {
                in_block = true;
            } else if let Some(rest) = trimmed.strip_prefix("import ") {
                if let Some(path) = import_entry_matches(rest.trim(), qualifier) {
                    return Some(path);
                }
            }
        }
        None
    }

    /// Strategy 1: caller and callee live in the same package. Compares the
    /// inferred candidate names and, when available, the caller file's
    /// literal `package` line against the callee package's trailing segment.
    fn same_package(&self, caller: &SourceUnit, callee_package: &str, corpus: &Corpus) -> bool {
        let wanted = callee_package.to_lowercase();
        if self
            .package_names(caller)
            .iter()
            .any(|p| p.to_lowercase() == wanted)
        {
            return true;
        }
        if let Some(file_text) = corpus.full_file(&caller.source_path) {
            if let Some(decl) = self.package_decl_name(file_text) {
                let tail = wanted.rsplit('/').next().unwrap_or(&wanted);
                return decl.to_lowercase() == tail;
            }
        }
        false
    }

    /// Trace a local variable to a bare type name, following chained
    /// assignments up to `MAX_CHAIN_DEPTH`. Returns the type name and
    /// whether the terminal binding was a parameter/receiver position.
    fn resolve_local_type(
        &self,
        bindings: &HashMap<String, LocalBinding>,
        var: &str,
        depth: usize,
    ) -> Option<(String, bool)> {
        if depth >= MAX_CHAIN_DEPTH {
            return None;
        }
        let binding = bindings.get(var)?;
        match &binding.hint {
            TypeHint::Declared(ty) => Some((bare_type_name(ty), false)),
            TypeHint::Parameter => {
                let ty = bare_type_name(&binding.value);
                if ty.is_empty() {
                    None
                } else {
                    Some((ty, true))
                }
            }
            TypeHint::ImplicitFromAssignment | TypeHint::ImplicitFromUsage => {
                let value = binding.value.trim();
                if let Some(ty) = struct_literal_type(value) {
                    return Some((ty, false));
                }
                // Chained assignment: the initializer references another
                // identifier in the same scope.
                let head = leading_identifier(value)?;
                if head == var {
                    return None;
                }
                self.resolve_local_type(bindings, head, depth + 1)
            }
        }
    }

    /// Is a type with this bare name declared in the callee's package?
    fn type_in_package(&self, name: &str, callee_package: &str, types: &TypeTable) -> bool {
        let wanted = callee_package.to_lowercase();
        types.iter().any(|(key, record)| {
            key.name == name
                && self
                    .package_names_for_path(&record.source_path)
                    .iter()
                    .any(|p| p.to_lowercase() == wanted)
        })
    }

    fn type_known(&self, name: &str, types: &TypeTable) -> bool {
        types.keys().any(|key| key.name == name)
    }

    /// Package check after a variable traced to a type name: primitives
    /// fail, a record in the callee package succeeds, and a parameter whose
    /// type is unknown to the table is conservatively accepted.
    fn resolved_type_reaches_package(
        &self,
        ty: &str,
        from_parameter: bool,
        callee_package: &str,
        types: &TypeTable,
    ) -> bool {
        if ty.is_empty() || PRIMITIVES.contains(&ty) {
            return false;
        }
        if self.type_in_package(ty, callee_package, types) {
            return true;
        }
        from_parameter && !self.type_known(ty, types)
    }

    /// Strategy 5: the qualifier is a struct field rather than a variable.
    /// Resolve `variable.field`, look the field's type up in the callee's
    /// package.
    fn resolve_field_access(
        &self,
        bindings: &HashMap<String, LocalBinding>,
        var: &str,
        field: &str,
        callee_package: &str,
        types: &TypeTable,
    ) -> bool {
        let Some((var_type, _)) = self.resolve_local_type(bindings, var, 0) else {
            return false;
        };
        let Some(record) = types
            .iter()
            .find(|(key, _)| key.name == var_type)
            .map(|(_, record)| record)
        else {
            return false;
        };
        let Some((_, field_type)) = record.fields.iter().find(|(name, _)| name == field) else {
            return false;
        };
        let field_type = bare_type_name(field_type);
        if field_type.is_empty() || PRIMITIVES.contains(&field_type.as_str()) {
            return false;
        }
        self.type_in_package(&field_type, callee_package, types)
    }

    /// Strategy 6 fallback when no local index entry exists: the qualifier
    /// appears as a parameter or receiver name in the header. Favors recall
    /// over precision at this leaf.
    fn qualifier_in_header(&self, caller: &SourceUnit, qualifier: &str) -> bool {
        let header = self.header(&caller.content);
        for (name, _) in parse_parameters(header) {
            if name == qualifier {
                return true;
            }
        }
        false
    }

    /// Resolve one call-site qualifier chain through the ordered strategies.
    fn qualifier_resolves(
        &self,
        caller: &SourceUnit,
        chain: &[&str],
        callee_package: &str,
        corpus: &Corpus,
        types: &TypeTable,
        locals: &LocalIndex,
    ) -> Result<bool> {
        // Strategy 1: bare invocation means same-package.
        if chain.is_empty() {
            return Ok(self.same_package(caller, callee_package, corpus));
        }
        let qualifier = chain[chain.len() - 1];
        let file_text = corpus.full_file(&caller.source_path);

        // Strategy 2: qualifier shadows the file's own package name.
        if let Some(text) = file_text {
            if self.package_decl_name(text).as_deref() == Some(qualifier)
                && self.same_package(caller, callee_package, corpus)
            {
                return Ok(true);
            }

            // Strategy 3: qualifier resolves through an import statement.
            if let Some(path) = self.import_path_for_qualifier(text, qualifier) {
                if path
                    .to_lowercase()
                    .contains(&callee_package.to_lowercase())
                {
                    return Ok(true);
                }
            }
        }

        // Strategies 4-6 need the caller's local bindings.
        let caller_key = unit_key(&self.function_name(caller)?, &caller.source_path);
        if let Some(bindings) = locals.get(&caller_key) {
            // Strategy 4: qualifier is a local variable or receiver.
            if bindings.contains_key(qualifier) {
                if let Some((ty, from_parameter)) =
                    self.resolve_local_type(bindings, qualifier, 0)
                {
                    return Ok(self.resolved_type_reaches_package(
                        &ty,
                        from_parameter,
                        callee_package,
                        types,
                    ));
                }
                return Ok(false);
            }
            // Strategy 5: qualifier is a field of a bound variable.
            if chain.len() >= 2 {
                let var = chain[chain.len() - 2];
                if bindings.contains_key(var) {
                    return Ok(self.resolve_field_access(
                        bindings,
                        var,
                        qualifier,
                        callee_package,
                        types,
                    ));
                }
            }
        }

        // Strategy 6: a parameter/receiver name with no resolvable type
        // information is conservatively accepted.
        Ok(self.qualifier_in_header(caller, qualifier))
    }

    fn parse_type_unit(&self, unit: &SourceUnit, table: &mut TypeTable) {
        let content = unit.content.trim_start();
        let Some(rest) = content.strip_prefix("type") else {
            return;
        };
        let rest = rest.trim_start();

        if rest.starts_with('(') {
            // Parenthesized multi-declaration block.
            let inner_start = match content.find('(') {
                Some(idx) => idx + 1,
                None => return,
            };
            let inner_end = content.rfind(')').unwrap_or(content.len());
            if inner_end <= inner_start {
                return;
            }
            self.parse_declaration_lines(&content[inner_start..inner_end], unit, table);
        } else {
            self.parse_declaration_lines(rest, unit, table);
        }
    }

    /// Parse one or more `Name <definition>` entries, gathering brace-bodied
    /// definitions across lines.
    fn parse_declaration_lines(&self, text: &str, unit: &SourceUnit, table: &mut TypeTable) {
        let mut offset = 0;
        while offset < text.len() {
            let rest = &text[offset..];
            let line_end = rest.find('\n').map(|i| offset + i).unwrap_or(text.len());
            let line = text[offset..line_end].trim();
            if line.is_empty() || self.is_comment_line(line) {
                offset = line_end + 1;
                continue;
            }

            if line.contains('{') {
                // Struct or interface body: consume through the matching brace.
                let open = match text[offset..].find('{') {
                    Some(idx) => offset + idx,
                    None => break,
                };
                let close = match matching_brace(text, open) {
                    Some(idx) => idx,
                    None => text.len(),
                };
                self.record_braced_decl(&text[offset..open], &text[open + 1..close], unit, table);
                offset = close + 1;
            } else {
                self.record_inline_decl(line, unit, table);
                offset = line_end + 1;
            }
        }
    }

    /// `Name struct` / `Name interface` header plus its brace body.
    fn record_braced_decl(
        &self,
        header: &str,
        body: &str,
        unit: &SourceUnit,
        table: &mut TypeTable,
    ) {
        let tokens: Vec<&str> = header.split_whitespace().collect();
        if tokens.is_empty() {
            return;
        }
        let name = strip_generic_params(tokens[0]);
        let kind = if tokens.iter().any(|t| *t == "interface") {
            TypeKind::Interface
        } else {
            TypeKind::Struct
        };
        let fields = match kind {
            TypeKind::Interface => parse_interface_body(body),
            _ => parse_struct_body(body),
        };
        table.insert(
            TypeKey { kind, name },
            TypeRecord {
                source_path: unit.source_path.clone(),
                kind,
                fields,
            },
        );
    }

    /// Single-line form: `Name = Other` or `Name Other`.
    fn record_inline_decl(&self, line: &str, unit: &SourceUnit, table: &mut TypeTable) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return;
        }
        let name = strip_generic_params(tokens[0]);
        table.insert(
            TypeKey {
                kind: TypeKind::Alias,
                name,
            },
            TypeRecord {
                source_path: unit.source_path.clone(),
                kind: TypeKind::Alias,
                fields: Vec::new(),
            },
        );
    }

    /// Line-oriented scan of one function body for variable bindings.
    fn scan_body_bindings(&self, content: &str, bindings: &mut HashMap<String, LocalBinding>) {
        let Some(body) = self.body(content) else {
            return;
        };
        for line in body.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || self.is_comment_line(trimmed) {
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix("var ") {
                record_var_decl(rest, bindings);
            } else if trimmed.contains(":=") {
                record_short_decl(trimmed, bindings);
            } else if let Some(idx) = plain_assignment_index(trimmed) {
                let lhs = trimmed[..idx].trim();
                let rhs = trimmed[idx + 1..].trim();
                if is_identifier(lhs) && !rhs.is_empty() {
                    bindings.entry(lhs.to_string()).or_insert(LocalBinding {
                        hint: TypeHint::ImplicitFromUsage,
                        value: rhs.to_string(),
                    });
                }
            }
        }
    }
}

impl Default for GoAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for GoAnalyzer {
    fn language_name(&self) -> &str {
        "go"
    }

    fn file_extensions(&self) -> &[&str] {
        &[".go"]
    }

    fn third_party_dir(&self) -> &str {
        THIRD_PARTY_DIR
    }

    fn is_searchable_file(&self, unit: &SourceUnit) -> bool {
        let file_name = unit
            .source_path
            .rsplit('/')
            .next()
            .unwrap_or(&unit.source_path);
        let stem = file_name.split('.').next().unwrap_or(file_name);
        !stem.to_lowercase().contains("test")
    }

    fn is_function(&self, unit: &SourceUnit) -> bool {
        unit.content.starts_with("func")
    }

    fn is_type_declaration(&self, unit: &SourceUnit) -> bool {
        unit.content.trim_start().starts_with("type")
    }

    fn function_name(&self, unit: &SourceUnit) -> Result<String> {
        let header = self.header(&unit.content);

        // Method: strip the receiver clause first.
        if header.starts_with("func (") {
            let after_receiver = header
                .find(')')
                .map(|idx| &header[idx + 1..])
                .ok_or_else(|| malformed_header(header))?;
            let name_end = after_receiver
                .find('(')
                .or_else(|| after_receiver.find('['))
                .ok_or_else(|| malformed_header(header))?;
            let name = after_receiver[..name_end].trim();
            if name.is_empty() {
                return Err(malformed_header(header));
            }
            return Ok(name.to_string());
        }

        // Regular function; `[` covers generic parameter lists. Whichever
        // delimiter appears first ends the name.
        let delim = match (header.find('('), header.find('[')) {
            (Some(p), Some(b)) => p.min(b),
            (Some(p), None) => p,
            (None, Some(b)) => b,
            (None, None) => return Err(malformed_header(header)),
        };
        let func_with_name = &header[..delim];
        let mut words = func_with_name.split_whitespace();
        let _keyword = words.next();
        match words.next() {
            Some(name) => Ok(name.to_string()),
            // Anonymous function literal: no extractable name.
            None => Err(malformed_header(header)),
        }
    }

    fn receiver_type(&self, unit: &SourceUnit) -> Option<String> {
        let header = self.header(&unit.content);
        let rest = header.strip_prefix("func (")?;
        let close = rest.find(')')?;
        let receiver = rest[..close].trim();
        let ty = receiver.split_whitespace().last()?;
        Some(bare_type_name(ty))
    }

    fn is_exported(&self, unit: &SourceUnit) -> Result<bool> {
        let name = self.function_name(unit)?;
        Ok(name
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false))
    }

    fn package_names(&self, unit: &SourceUnit) -> Vec<String> {
        self.package_names_for_path(&unit.source_path)
    }

    fn is_root_package(&self, unit: &SourceUnit) -> bool {
        !unit.source_path.starts_with(THIRD_PARTY_DIR)
    }

    fn parse_type_declarations(&self, corpus: &Corpus) -> TypeTable {
        let mut table = TypeTable::new();
        for unit in corpus.declarations() {
            if self.is_type_declaration(unit) {
                self.parse_type_unit(unit, &mut table);
            }
        }
        table
    }

    fn index_local_variables(&self, corpus: &Corpus) -> LocalIndex {
        let mut index = LocalIndex::new();
        for unit in corpus.declarations() {
            if !self.is_function(unit) {
                continue;
            }
            let name = match self.function_name(unit) {
                Ok(name) => name,
                Err(err) => {
                    warn!("Skipping unparseable function in {}: {}", unit.source_path, err);
                    continue;
                }
            };

            let mut bindings = HashMap::new();
            let header = self.header(&unit.content);

            // Receiver binds like a parameter with a known type.
            if let Some(rest) = header.strip_prefix("func (") {
                if let Some(close) = rest.find(')') {
                    let receiver = rest[..close].trim();
                    let mut words = receiver.split_whitespace();
                    if let (Some(var), Some(ty)) = (words.next(), words.next()) {
                        bindings.insert(
                            var.to_string(),
                            LocalBinding {
                                hint: TypeHint::Parameter,
                                value: ty.to_string(),
                            },
                        );
                    }
                }
            }

            for (param, ty) in parse_parameters(header) {
                bindings.entry(param).or_insert(LocalBinding {
                    hint: TypeHint::Parameter,
                    value: ty,
                });
            }

            self.scan_body_bindings(&unit.content, &mut bindings);
            index.insert(unit_key(&name, &unit.source_path), bindings);
        }
        index
    }

    fn resolves_call(
        &self,
        caller: &SourceUnit,
        callee_name: &str,
        callee_package: &str,
        corpus: &Corpus,
        types: &TypeTable,
        locals: &LocalIndex,
    ) -> Result<bool> {
        let Some(body) = self.body_without_comments(&caller.content) else {
            return Ok(false);
        };

        // Syntactic filter first: bail out when no invocation of the callee
        // is present at all.
        let pattern = format!(
            r"(?m)(?:([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\.)?\b{}\s*\(",
            regex::escape(callee_name)
        );
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(_) => return Ok(false),
        };

        // A body may invoke the callee through several distinct qualifiers;
        // the first one that resolves wins.
        for caps in re.captures_iter(&body) {
            let chain: Vec<&str> = caps
                .get(1)
                .map(|m| m.as_str().split('.').collect())
                .unwrap_or_default();
            if self.qualifier_resolves(caller, &chain, callee_package, corpus, types, locals)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn malformed_header(header: &str) -> CalltraceError {
    CalltraceError::MalformedSource(format!("invalid function header: {}", header.trim()))
}

fn is_version_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some('v') | Some('V'))
        && !segment[1..].is_empty()
        && segment[1..].len() <= 2
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
}

/// Leading identifier token of an expression, for chained-assignment
/// tracing (`x := other` or `x := other.Field`).
fn leading_identifier(expr: &str) -> Option<&str> {
    let end = expr
        .find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
        .unwrap_or(expr.len());
    let head = &expr[..end];
    if is_identifier(head) {
        Some(head)
    } else {
        None
    }
}

/// Strip pointers, slices, generic parameters and package qualifiers down
/// to a bare type name.
fn bare_type_name(ty: &str) -> String {
    let mut t = ty.trim();
    loop {
        let before = t;
        t = t.trim_start_matches(['&', '*']);
        t = t.strip_prefix("[]").unwrap_or(t);
        t = t.strip_prefix("...").unwrap_or(t);
        if t == before {
            break;
        }
    }
    let t = t.split('{').next().unwrap_or(t);
    let t = t.split('[').next().unwrap_or(t);
    let t = t.rsplit('.').next().unwrap_or(t);
    t.trim().to_string()
}

fn strip_generic_params(name: &str) -> String {
    name.split('[').next().unwrap_or(name).trim().to_string()
}

/// Struct-literal initializer (`T{...}`, `&pkg.T{...}`) down to the bare
/// type name.
fn struct_literal_type(expr: &str) -> Option<String> {
    let trimmed = expr.trim().trim_start_matches('&');
    let brace = trimmed.find('{')?;
    let head = trimmed[..brace].trim();
    if head.is_empty() {
        return None;
    }
    let candidate = head.rsplit('.').next().unwrap_or(head);
    if is_identifier(candidate) {
        Some(candidate.to_string())
    } else {
        None
    }
}

/// Find the closing brace matching the opener at `open_idx`. Purely
/// lexical: braces inside strings or comments will miscount.
fn matching_brace(text: &str, open_idx: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for (idx, byte) in bytes.iter().enumerate().skip(open_idx) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Struct body field lines: `Name Type`, `A, B Type`, embedded `pkg.Type`.
fn parse_struct_body(body: &str) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        // Drop struct tags and trailing comments.
        let line = line.split('`').next().unwrap_or(line).trim();
        let line = line.split("//").next().unwrap_or(line).trim();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens.len() == 1 {
            // Embedded field: name is the bare type name.
            let ty = tokens[0];
            fields.push((bare_type_name(ty), ty.to_string()));
            continue;
        }
        let mut idx = 0;
        let mut names = Vec::new();
        while idx < tokens.len() - 1 {
            let token = tokens[idx];
            names.push(token.trim_end_matches(','));
            idx += 1;
            if !token.ends_with(',') {
                break;
            }
        }
        let ty = tokens[idx..].join(" ");
        for name in names {
            fields.push((name.to_string(), ty.clone()));
        }
    }
    fields
}

/// Interface bodies list method signatures; the name is everything before
/// the parameter list's parenthesis.
fn parse_interface_body(body: &str) -> Vec<(String, String)> {
    let mut methods = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        match line.find('(') {
            Some(idx) => {
                let name = line[..idx].trim();
                if !name.is_empty() {
                    methods.push((name.to_string(), line[idx..].trim().to_string()));
                }
            }
            // Embedded interface.
            None => methods.push((bare_type_name(line), line.to_string())),
        }
    }
    methods
}

/// Parameter list of a header as `(name, declared type)` pairs. Grouped
/// parameters (`a, b int`) share the trailing type.
fn parse_parameters(header: &str) -> Vec<(String, String)> {
    // Skip the receiver clause for methods.
    let after_receiver = if header.starts_with("func (") {
        match header.find(')') {
            Some(idx) => &header[idx + 1..],
            None => return Vec::new(),
        }
    } else {
        header
    };
    let Some(open) = after_receiver.find('(') else {
        return Vec::new();
    };
    let Some(close) = matching_paren(after_receiver, open) else {
        return Vec::new();
    };
    let params = &after_receiver[open + 1..close];

    let entries = split_top_level_commas(params);
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = entry.splitn(2, char::is_whitespace).collect();
        if tokens.len() == 1 {
            // Either a name sharing a later type, or an unnamed type.
            if is_identifier(tokens[0]) {
                pending.push(tokens[0].to_string());
            } else {
                pending.clear();
            }
            continue;
        }
        let ty = tokens[1].trim().to_string();
        for name in pending.drain(..) {
            pairs.push((name, ty.clone()));
        }
        if is_identifier(tokens[0]) {
            pairs.push((tokens[0].to_string(), ty));
        }
    }
    pairs
}

fn matching_paren(text: &str, open_idx: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, byte) in text.as_bytes().iter().enumerate().skip(open_idx) {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, byte) in text.as_bytes().iter().enumerate() {
        match byte {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// `var name [type] [= expr]` forms.
fn record_var_decl(rest: &str, bindings: &mut HashMap<String, LocalBinding>) {
    if let Some(eq) = rest.find('=') {
        let lhs = rest[..eq].trim();
        let rhs = rest[eq + 1..].trim();
        let tokens: Vec<&str> = lhs.split_whitespace().collect();
        match tokens.as_slice() {
            [name] if is_identifier(name) => {
                bindings.entry((*name).to_string()).or_insert(LocalBinding {
                    hint: TypeHint::ImplicitFromAssignment,
                    value: rhs.to_string(),
                });
            }
            [name, ty @ ..] if is_identifier(name) => {
                bindings.entry((*name).to_string()).or_insert(LocalBinding {
                    hint: TypeHint::Declared(ty.join(" ")),
                    value: rhs.to_string(),
                });
            }
            _ => {}
        }
    } else {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        if tokens.len() >= 2 && is_identifier(tokens[0]) {
            bindings.entry(tokens[0].to_string()).or_insert(LocalBinding {
                hint: TypeHint::Declared(tokens[1..].join(" ")),
                value: String::new(),
            });
        }
    }
}

/// Short declarations. Conditional-scoped forms (`if x := f(); ...`) bind
/// only up to the statement's semicolon; block-scoped forms take the rest
/// of the line.
fn record_short_decl(line: &str, bindings: &mut HashMap<String, LocalBinding>) {
    let Some(idx) = line.find(":=") else {
        return;
    };
    let mut lhs = line[..idx].trim();
    let conditional = ["if ", "for ", "switch "]
        .iter()
        .find_map(|kw| lhs.strip_prefix(kw));
    if let Some(stripped) = conditional {
        lhs = stripped.trim();
    }
    let rhs_full = line[idx + 2..].trim();
    let rhs = if conditional.is_some() {
        rhs_full.split(';').next().unwrap_or(rhs_full).trim()
    } else {
        rhs_full
    };
    for name in lhs.split(',') {
        let name = name.trim();
        if name == "_" || !is_identifier(name) {
            continue;
        }
        bindings.entry(name.to_string()).or_insert(LocalBinding {
            hint: TypeHint::ImplicitFromAssignment,
            value: rhs.to_string(),
        });
    }
}

/// Position of a plain `=` assignment, rejecting comparison and compound
/// operators.
fn plain_assignment_index(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let idx = line.find('=')?;
    if idx == 0 || idx + 1 >= bytes.len() {
        return None;
    }
    let prev = bytes[idx - 1];
    let next = bytes[idx + 1];
    if next == b'=' || matches!(prev, b'=' | b'!' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'%' | b'&' | b'|' | b'^' | b':') {
        return None;
    }
    Some(idx)
}

/// One entry of an import block or single-line import. Returns the import
/// path when the entry corresponds to the qualifier, by alias if present,
/// else by the path's trailing segment.
fn import_entry_matches(entry: &str, qualifier: &str) -> Option<String> {
    let entry = entry.split("//").next().unwrap_or(entry).trim();
    let first_quote = entry.find('"')?;
    let rest = &entry[first_quote + 1..];
    let second_quote = rest.find('"')?;
    let path = &rest[..second_quote];

    let alias = entry[..first_quote].trim();
    if !alias.is_empty() {
        return if alias == qualifier {
            Some(path.to_string())
        } else {
            None
        };
    }

    let mut segments = path.rsplit('/');
    let last = segments.next()?;
    if last == qualifier {
        return Some(path.to_string());
    }
    // Versioned module paths alias to the segment before `vN`.
    if is_version_segment(last) && segments.next() == Some(qualifier) {
        return Some(path.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::super::super::source_unit::{Language, UnitKind};
    use super::*;

    fn decl(content: &str, path: &str) -> SourceUnit {
        SourceUnit::new(content, path, UnitKind::FunctionOrType, Language::Go)
    }

    fn full(content: &str, path: &str) -> SourceUnit {
        SourceUnit::new(content, path, UnitKind::FullFile, Language::Go)
    }

    #[test]
    fn function_name_of_plain_function() {
        let analyzer = GoAnalyzer::new();
        let unit = decl("func NewTargeted(targets map[float64]float64) *Stream {\n\treturn nil\n}", "vendor/github.com/beorn7/perks/quantile/stream.go");
        assert_eq!(analyzer.function_name(&unit).unwrap(), "NewTargeted");
        assert!(analyzer.is_exported(&unit).unwrap());
    }

    #[test]
    fn function_name_strips_receiver_clause() {
        let analyzer = GoAnalyzer::new();
        let unit = decl("func (s *Stream) Query(q float64) float64 {\n\treturn 0\n}", "vendor/github.com/beorn7/perks/quantile/stream.go");
        assert_eq!(analyzer.function_name(&unit).unwrap(), "Query");
        assert_eq!(analyzer.receiver_type(&unit).as_deref(), Some("Stream"));
    }

    #[test]
    fn function_name_of_generic_function() {
        let analyzer = GoAnalyzer::new();
        let unit = decl("func Map[T any](items []T) []T {\n\treturn items\n}", "pkg/util/map.go");
        assert_eq!(analyzer.function_name(&unit).unwrap(), "Map");
    }

    #[test]
    fn anonymous_function_is_malformed() {
        let analyzer = GoAnalyzer::new();
        let unit = decl("func() {\n}", "pkg/util/anon.go");
        assert!(matches!(
            analyzer.function_name(&unit),
            Err(CalltraceError::MalformedSource(_))
        ));
    }

    #[test]
    fn unexported_function_detected() {
        let analyzer = GoAnalyzer::new();
        let unit = decl("func helper() {\n}", "pkg/util/helper.go");
        assert!(!analyzer.is_exported(&unit).unwrap());
    }

    #[test]
    fn package_names_for_vendored_path() {
        let analyzer = GoAnalyzer::new();
        let unit = decl("func F() {}", "vendor/github.com/acme/leaf/target.go");
        assert_eq!(
            analyzer.package_names(&unit),
            vec!["github.com/acme".to_string(), "github.com/acme/leaf".to_string()]
        );
        assert!(!analyzer.is_root_package(&unit));
    }

    #[test]
    fn package_names_carry_major_version_suffix() {
        let analyzer = GoAnalyzer::new();
        let unit = decl("func F() {}", "vendor/github.com/acme/leaf/v2/target.go");
        assert_eq!(
            analyzer.package_names(&unit),
            vec![
                "github.com/acme/v2".to_string(),
                "github.com/acme/leaf/v2".to_string()
            ]
        );
    }

    #[test]
    fn package_names_for_application_path() {
        let analyzer = GoAnalyzer::new();
        let unit = decl("func main() {}", "cmd/app/main.go");
        assert_eq!(
            analyzer.package_names(&unit),
            vec!["cmd/app".to_string(), "cmd/app/main.go".to_string()]
        );
        assert!(analyzer.is_root_package(&unit));
    }

    #[test]
    fn package_name_requires_exact_match() {
        let analyzer = GoAnalyzer::new();
        let unit = decl("func F() {}", "vendor/github.com/acme/leaf/target.go");
        assert_eq!(
            analyzer.package_name(&unit, "GitHub.com/Acme/Leaf").as_deref(),
            Some("github.com/acme/leaf")
        );
        assert!(analyzer.package_name(&unit, "github.com/acme/le").is_none());
    }

    #[test]
    fn test_files_are_not_searchable() {
        let analyzer = GoAnalyzer::new();
        assert!(!analyzer.is_searchable_file(&decl("func TestF(t *testing.T) {}", "pkg/a/a_test.go")));
        assert!(analyzer.is_searchable_file(&decl("func F() {}", "pkg/a/a.go")));
    }

    #[test]
    fn type_table_covers_struct_interface_and_alias() {
        let analyzer = GoAnalyzer::new();
        let corpus = Corpus::new(vec![
            decl(
                "type Stream struct {\n\t*stream\n\tb      Samples\n\tsorted bool\n}",
                "vendor/github.com/beorn7/perks/quantile/stream.go",
            ),
            decl(
                "type Sampler interface {\n\tSample(q float64) float64\n\tReset()\n}",
                "vendor/github.com/beorn7/perks/quantile/sampler.go",
            ),
            decl("type Samples = []Sample", "vendor/github.com/beorn7/perks/quantile/sample.go"),
            decl(
                "type (\n\tWeight float64\n\tBucket struct {\n\t\tCount int\n\t}\n)",
                "vendor/github.com/beorn7/perks/quantile/bucket.go",
            ),
        ]);
        let table = analyzer.parse_type_declarations(&corpus);

        let stream = table
            .get(&TypeKey { kind: TypeKind::Struct, name: "Stream".into() })
            .unwrap();
        assert!(stream.fields.contains(&("b".to_string(), "Samples".to_string())));
        assert!(stream.fields.contains(&("stream".to_string(), "*stream".to_string())));

        let sampler = table
            .get(&TypeKey { kind: TypeKind::Interface, name: "Sampler".into() })
            .unwrap();
        assert_eq!(sampler.fields[0].0, "Sample");

        assert!(table.contains_key(&TypeKey { kind: TypeKind::Alias, name: "Samples".into() }));
        assert!(table.contains_key(&TypeKey { kind: TypeKind::Alias, name: "Weight".into() }));
        assert!(table.contains_key(&TypeKey { kind: TypeKind::Struct, name: "Bucket".into() }));
    }

    #[test]
    fn local_index_records_params_vars_and_short_decls() {
        let analyzer = GoAnalyzer::new();
        let corpus = Corpus::new(vec![decl(
            "func (s *Server) Handle(w http.ResponseWriter, count int) {\n\tvar q quantile.Stream\n\tclient := perks.Client{}\n\tif err := q.Flush(); err != nil {\n\t\treturn\n\t}\n\tother = client\n}",
            "cmd/app/server.go",
        )]);
        let index = analyzer.index_local_variables(&corpus);
        let bindings = index.get("Handle@cmd/app/server.go").unwrap();

        assert_eq!(bindings.get("s").unwrap().hint, TypeHint::Parameter);
        assert_eq!(bindings.get("w").unwrap().hint, TypeHint::Parameter);
        assert_eq!(bindings.get("w").unwrap().value, "http.ResponseWriter");
        assert_eq!(
            bindings.get("q").unwrap().hint,
            TypeHint::Declared("quantile.Stream".to_string())
        );
        assert_eq!(
            bindings.get("client").unwrap().hint,
            TypeHint::ImplicitFromAssignment
        );
        // Conditional-scoped binding stops at the semicolon.
        assert_eq!(bindings.get("err").unwrap().value, "q.Flush()");
        assert_eq!(
            bindings.get("other").unwrap().hint,
            TypeHint::ImplicitFromUsage
        );
    }

    #[test]
    fn bare_call_resolves_within_same_package() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func wrap() {\n\tTarget()\n}",
            "vendor/github.com/acme/leaf/other.go",
        );
        let corpus = Corpus::new(vec![caller.clone()]);
        let types = TypeTable::new();
        let locals = analyzer.index_local_variables(&corpus);

        assert!(analyzer
            .resolves_call(&caller, "Target", "github.com/acme/leaf", &corpus, &types, &locals)
            .unwrap());
        assert!(!analyzer
            .resolves_call(&caller, "Target", "github.com/other/pkg", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn import_alias_round_trip() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func Run() {\n\tq.Foo()\n}",
            "cmd/app/main.go",
        );
        let file = full(
            "package main\n\nimport q \"github.com/acme/pkg/path\"\n\nfunc Run() {\n\tq.Foo()\n}\n",
            "cmd/app/main.go",
        );
        let corpus = Corpus::new(vec![caller.clone(), file]);
        let types = TypeTable::new();
        let locals = analyzer.index_local_variables(&corpus);

        assert!(analyzer
            .resolves_call(&caller, "Foo", "github.com/acme/pkg/path", &corpus, &types, &locals)
            .unwrap());
        assert!(!analyzer
            .resolves_call(&caller, "Foo", "github.com/other/lib", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn import_block_matches_trailing_segment() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func Run() {\n\tleaf.Target()\n}",
            "cmd/app/main.go",
        );
        let file = full(
            "package main\n\nimport (\n\t\"fmt\"\n\t\"github.com/acme/leaf\"\n)\n",
            "cmd/app/main.go",
        );
        let corpus = Corpus::new(vec![caller.clone(), file]);
        let types = TypeTable::new();
        let locals = analyzer.index_local_variables(&corpus);

        assert!(analyzer
            .resolves_call(&caller, "Target", "github.com/acme/leaf", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn local_variable_traces_to_callee_package_type() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func Run() {\n\ts := quantile.Stream{}\n\ts.Query(0.5)\n}",
            "cmd/app/main.go",
        );
        let stream_type = decl(
            "type Stream struct {\n\tsorted bool\n}",
            "vendor/github.com/beorn7/perks/quantile/stream.go",
        );
        let corpus = Corpus::new(vec![caller.clone(), stream_type]);
        let types = analyzer.parse_type_declarations(&corpus);
        let locals = analyzer.index_local_variables(&corpus);

        assert!(analyzer
            .resolves_call(&caller, "Query", "github.com/beorn7/perks", &corpus, &types, &locals)
            .unwrap());
        assert!(!analyzer
            .resolves_call(&caller, "Query", "github.com/other/lib", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn primitive_typed_variable_never_resolves() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func Run() {\n\tvar n int\n\tn.Foo()\n}",
            "cmd/app/main.go",
        );
        let corpus = Corpus::new(vec![caller.clone()]);
        let types = TypeTable::new();
        let locals = analyzer.index_local_variables(&corpus);

        assert!(!analyzer
            .resolves_call(&caller, "Foo", "github.com/acme/leaf", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn chained_assignment_traces_through_intermediate_variable() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func Run() {\n\torig := quantile.Stream{}\n\talias := orig\n\talias.Query(0.5)\n}",
            "cmd/app/main.go",
        );
        let stream_type = decl(
            "type Stream struct {\n}",
            "vendor/github.com/beorn7/perks/quantile/stream.go",
        );
        let corpus = Corpus::new(vec![caller.clone(), stream_type]);
        let types = analyzer.parse_type_declarations(&corpus);
        let locals = analyzer.index_local_variables(&corpus);

        assert!(analyzer
            .resolves_call(&caller, "Query", "github.com/beorn7/perks", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn struct_field_resolution_follows_field_type_package() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func Run() {\n\tv := Wrapper{}\n\tv.Inner.Method()\n}",
            "cmd/app/main.go",
        );
        let wrapper = decl(
            "type Wrapper struct {\n\tInner remote.Widget\n}",
            "cmd/app/types.go",
        );
        let widget = decl(
            "type Widget struct {\n\tid string\n}",
            "vendor/github.com/acme/remote/widget.go",
        );
        let corpus = Corpus::new(vec![caller.clone(), wrapper, widget]);
        let types = analyzer.parse_type_declarations(&corpus);
        let locals = analyzer.index_local_variables(&corpus);

        assert!(analyzer
            .resolves_call(&caller, "Method", "github.com/acme/remote", &corpus, &types, &locals)
            .unwrap());
        assert!(!analyzer
            .resolves_call(&caller, "Method", "github.com/elsewhere/lib", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn unresolvable_parameter_qualifier_is_accepted() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func Run(client opaque.Client) {\n\tclient.Fire()\n}",
            "cmd/app/main.go",
        );
        let corpus = Corpus::new(vec![caller.clone()]);
        let types = TypeTable::new();
        let locals = analyzer.index_local_variables(&corpus);

        // Favors recall: no type information contradicts the call.
        assert!(analyzer
            .resolves_call(&caller, "Fire", "github.com/acme/anything", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn unknown_qualifier_is_rejected() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func Run() {\n\tglobalThing.Fire()\n}",
            "cmd/app/main.go",
        );
        let corpus = Corpus::new(vec![caller.clone()]);
        let types = TypeTable::new();
        let locals = analyzer.index_local_variables(&corpus);

        assert!(!analyzer
            .resolves_call(&caller, "Fire", "github.com/acme/leaf", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn commented_out_calls_do_not_match() {
        let analyzer = GoAnalyzer::new();
        let caller = decl(
            "func Run() {\n\t// Target()\n}",
            "vendor/github.com/acme/leaf/other.go",
        );
        let corpus = Corpus::new(vec![caller.clone()]);
        let types = TypeTable::new();
        let locals = analyzer.index_local_variables(&corpus);

        assert!(!analyzer
            .resolves_call(&caller, "Target", "github.com/acme/leaf", &corpus, &types, &locals)
            .unwrap());
    }

    #[test]
    fn absent_call_fails_fast() {
        let analyzer = GoAnalyzer::new();
        let caller = decl("func Run() {\n\tOther()\n}", "cmd/app/main.go");
        let corpus = Corpus::new(vec![caller.clone()]);
        let types = TypeTable::new();
        let locals = analyzer.index_local_variables(&corpus);

        assert!(!analyzer
            .resolves_call(&caller, "Target", "cmd/app", &corpus, &types, &locals)
            .unwrap());
    }
}
