//! JAF front end (spec §3.3/§4.3-§4.7): lexer, parser, a type resolver, a
//! declaration pass, a static analyser, a variable allocator, and the
//! bytecode emitter in [`crate::emit`]. [`compile`] runs every pass over one
//! concatenated translation unit and leaves `ain` ready to serialize.

pub mod alloc;
pub mod analyse;
pub mod ast;
pub mod declare;
pub mod lexer;
pub mod parser;
pub mod resolve;

use crate::{AinFile, Result, Warning};

/// One JAF input file, named for diagnostics.
pub struct Source<'a> {
    pub filename: crate::Str,
    pub text: &'a str,
}

/// Compile a set of JAF sources into `ain`, running every pass of the front
/// end in order (spec §4.4): parse (all files, in order, each one's
/// struct/interface/functype/delegate tags visible to the next), resolve
/// types, declare, analyse, allocate, emit.
pub fn compile(ain: &mut AinFile, sources: &[Source]) -> Result<Vec<Warning>> {
    let mut program = ast::Program::default();
    for src in sources {
        let mut parser = parser::Parser::new(src.text, src.filename.clone(), ain)?;
        let mut file_program = parser.parse_program()?;
        program.decls.append(&mut file_program.decls);
    }

    resolve::resolve_types(ain, &mut program)?;
    let mut warnings = declare::declare(ain, &mut program)?;
    let analysis_warnings = analyse::analyse(ain, &mut program)?;
    warnings.extend(analysis_warnings);
    alloc::allocate(ain, &mut program)?;
    warnings.extend(crate::emit::emit(ain, &program)?);
    Ok(warnings)
}
