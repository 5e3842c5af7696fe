//! `guess_filenames`-style heuristic (spec §6, ambient supplement), grounded
//! in `guess_filenames.c`: when debug info is present but the filename table
//! is missing or unhelpful, reconstruct plausible per-file source names from
//! the namespace prefix shared by a run of function names.
//!
//! The original sweeps the disassembled instruction stream and starts a new
//! group at every `_EOF` debug marker. This codec doesn't model a per-function
//! file index, so the heuristic here groups consecutive functions (in pool
//! order, skipping the reserved null entry and `<lambda...>` entries exactly
//! as the original does) by shared namespace prefix instead, which is the
//! same grouping signal the original's prefix search relies on. Best-effort;
//! never fails.

use crate::{AinFile, Str};

fn prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Rewrite a name prefix into a path-safe file name component, the way
/// `guess_from_function_name` does: `@` and `::` become `/`, and characters
/// illegal in a file name become `_`.
fn sanitize(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    let mut chars = prefix.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '@' => out.push('/'),
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                out.push('/');
            }
            c if (c as u32) < 32 || "<>:/\\|?*".contains(c) => out.push('_'),
            c => out.push(c),
        }
    }
    out
}

/// Guess one file name for a group of function names sharing a namespace,
/// mirroring `guess()`: find the longest common prefix, back off to the last
/// `@`/`::` boundary inside it, and sanitize; fall back to `n` (the group's
/// ordinal) when no usable prefix exists.
fn guess_group_name(names: &[&str], n: usize) -> String {
    let Some(&first) = names.first() else {
        return n.to_string();
    };
    if names.len() == 1 {
        return n.to_string();
    }
    let mut common = first.len();
    for name in &names[1..] {
        common = common.min(prefix_len(first, name));
    }
    if common == 0 {
        return n.to_string();
    }
    let prefix = &first[..common];
    let boundary = prefix.rfind(|c| c == '@' || c == ':').map(|i| i + 1).unwrap_or(common);
    if boundary == 0 {
        return n.to_string();
    }
    sanitize(&first[..boundary])
}

impl AinFile {
    /// Populate `filenames` with one guessed name per contiguous run of
    /// functions that share a namespace prefix (spec §6 ambient supplement).
    /// Does nothing if `filenames` is already populated. Never fails.
    pub fn guess_filenames(&mut self) {
        if !self.filenames.is_empty() {
            return;
        }

        let named: Vec<&str> = self
            .functions
            .iter()
            .skip(1)
            .map(|f| f.name.as_str())
            .filter(|n| !n.starts_with("<lambda"))
            .collect();
        if named.is_empty() {
            return;
        }

        let mut groups: Vec<Vec<&str>> = Vec::new();
        for name in named {
            match groups.last_mut() {
                Some(group) if prefix_len(group[0], name) > 0 => group.push(name),
                _ => groups.push(vec![name]),
            }
        }

        self.filenames = groups
            .iter()
            .enumerate()
            .map(|(i, g)| Str::from(guess_group_name(g, i)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Function;

    fn named(name: &str) -> Function {
        let mut f = Function::null();
        f.name = Str::from(name);
        f
    }

    #[test]
    fn groups_by_shared_namespace_prefix() {
        let mut ain = AinFile::new(6, 0);
        ain.functions.push(named("Menu@Open"));
        ain.functions.push(named("Menu@Close"));
        ain.functions.push(named("Battle@Start"));
        ain.guess_filenames();
        assert_eq!(ain.filenames.len(), 2);
        assert_eq!(ain.filenames[0].as_str(), "Menu/");
        assert_eq!(ain.filenames[1].as_str(), "1");
    }

    #[test]
    fn skips_lambdas_and_leaves_existing_table_alone() {
        let mut ain = AinFile::new(6, 0);
        ain.filenames.push(Str::from("already.jaf"));
        ain.functions.push(named("<lambda0>"));
        ain.guess_filenames();
        assert_eq!(ain.filenames.len(), 1);
        assert_eq!(ain.filenames[0].as_str(), "already.jaf");
    }

    #[test]
    fn does_nothing_with_no_named_functions() {
        let mut ain = AinFile::new(6, 0);
        ain.guess_filenames();
        assert!(ain.filenames.is_empty());
    }
}
