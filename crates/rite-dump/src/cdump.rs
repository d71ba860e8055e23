//! Binary output as C source.

use std::io::Write;

use rite_compiler::Irep;
use rite_core::{DumpError, SymbolTable};

use crate::{DumpFlags, DumpOptions, dump_irep};

const BYTES_PER_LINE: usize = 16;

/// Write the serialized tree to `out`.
pub fn dump_irep_binary(
    irep: &Irep,
    symbols: &SymbolTable,
    options: &DumpOptions,
    out: &mut impl Write,
) -> Result<(), DumpError> {
    let bin = dump_irep(irep, symbols, options)?;
    out.write_all(&bin)?;
    Ok(())
}

/// Write the serialized tree as a C `uint8_t` array named `initname`.
///
/// The array is `static` with [`DumpFlags::STATIC`], otherwise it gets
/// external linkage (`extern` under C++).
pub fn dump_irep_cfunc(
    irep: &Irep,
    symbols: &SymbolTable,
    options: &DumpOptions,
    initname: &str,
    out: &mut impl Write,
) -> Result<(), DumpError> {
    if initname.is_empty() {
        return Err(DumpError::InvalidArgument("initializer name is empty"));
    }
    let bin = dump_irep(irep, symbols, options)?;

    writeln!(out, "#include <stdint.h>")?;
    write!(out, "{}\nconst uint8_t {initname}[] = {{", linkage(options.flags))?;
    for line in bin.chunks(BYTES_PER_LINE) {
        writeln!(out)?;
        for byte in line {
            write!(out, "0x{byte:02x},")?;
        }
    }
    write!(out, "\n}};\n")?;
    Ok(())
}

/// Storage class line of a generated C definition.
pub(crate) fn linkage(flags: DumpFlags) -> &'static str {
    if flags.contains(DumpFlags::STATIC) {
        "static"
    } else {
        "#ifdef __cplusplus\nextern\n#endif"
    }
}
