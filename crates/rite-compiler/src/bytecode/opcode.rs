//! Instruction set of the register VM.
//!
//! Each instruction is one opcode byte followed by operands whose layout is
//! given by its [`OperandFormat`]. Operands are 8 bits wide unless the
//! instruction is preceded by one of the extension prefixes (`EXT1`,
//! `EXT2`, `EXT3`), which widen the first, the second, or both leading
//! operands to 16 bits. Opcode numbering is part of the RITE 03 binary
//! format and must not be reordered.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Operand layout of an instruction.
///
/// `B` is an 8-bit register/index operand, `S` a 16-bit big-endian operand,
/// `W` a 24-bit big-endian operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandFormat {
    Z,
    B,
    BB,
    BBB,
    BS,
    BSS,
    S,
    W,
}

/// Which extension prefix precedes an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ext {
    #[default]
    None,
    /// First operand is 16 bits.
    Ext1,
    /// Second operand is 16 bits.
    Ext2,
    /// First and second operands are 16 bits.
    Ext3,
}

impl Ext {
    #[inline]
    pub fn first_wide(self) -> bool {
        matches!(self, Ext::Ext1 | Ext::Ext3)
    }

    #[inline]
    pub fn second_wide(self) -> bool {
        matches!(self, Ext::Ext2 | Ext::Ext3)
    }

    /// Prefix selecting the given operand widths, if any is wide.
    pub fn for_operands(a_wide: bool, b_wide: bool) -> Ext {
        match (a_wide, b_wide) {
            (false, false) => Ext::None,
            (true, false) => Ext::Ext1,
            (false, true) => Ext::Ext2,
            (true, true) => Ext::Ext3,
        }
    }

    pub fn opcode(self) -> Option<OpCode> {
        match self {
            Ext::None => None,
            Ext::Ext1 => Some(OpCode::Ext1),
            Ext::Ext2 => Some(OpCode::Ext2),
            Ext::Ext3 => Some(OpCode::Ext3),
        }
    }
}

impl OperandFormat {
    /// Encoded size in bytes, opcode included, extension prefix excluded.
    pub fn size(self, ext: Ext) -> usize {
        let a = if ext.first_wide() { 2 } else { 1 };
        let b = if ext.second_wide() { 2 } else { 1 };
        match self {
            OperandFormat::Z => 1,
            OperandFormat::B => 1 + a,
            OperandFormat::BB => 1 + a + b,
            OperandFormat::BBB => 1 + a + b + 1,
            OperandFormat::BS => 1 + a + 2,
            OperandFormat::BSS => 1 + a + 4,
            OperandFormat::S => 3,
            OperandFormat::W => 4,
        }
    }
}

/// Register VM opcodes.
///
/// `R[x]` is register x, `Pool[x]` a literal pool entry, `Syms[x]` an entry
/// of the unit's symbol table, `Irep[x]` a child unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum OpCode {
    // =========================================================================
    // Loads
    // =========================================================================
    /// No operation.
    Nop = 0,
    /// `R[a] = R[b]`
    Move,
    /// `R[a] = Pool[b]`
    LoadL,
    /// `R[a] = b`
    LoadI,
    /// `R[a] = -b`
    LoadINeg,
    /// `R[a] = -1`
    LoadIMinus1,
    /// `R[a] = 0`
    LoadI0,
    LoadI1,
    LoadI2,
    LoadI3,
    LoadI4,
    LoadI5,
    LoadI6,
    /// `R[a] = 7`
    LoadI7,
    /// `R[a] = (i16)b`
    LoadI16,
    /// `R[a] = (i32)(b << 16 | c)`
    LoadI32,
    /// `R[a] = Syms[b]`
    LoadSym,
    LoadNil,
    LoadSelf,
    LoadT,
    LoadF,

    // =========================================================================
    // Variables
    // =========================================================================
    GetGv,
    SetGv,
    GetSv,
    SetSv,
    GetIv,
    SetIv,
    GetCv,
    SetCv,
    GetConst,
    SetConst,
    /// `R[a] = R[a]::Syms[b]`
    GetMcnst,
    /// `R[a+1]::Syms[b] = R[a]`
    SetMcnst,
    /// `R[a] = uvget(b, c)`
    GetUpvar,
    /// `uvset(b, c, R[a])`
    SetUpvar,
    /// `R[a] = R[a][R[a+1]]`
    GetIdx,
    /// `R[a][R[a+1]] = R[a+2]`
    SetIdx,

    // =========================================================================
    // Control Flow
    // =========================================================================
    /// `pc += a`
    Jmp,
    /// `if R[a] then pc += b`
    JmpIf,
    /// `unless R[a] then pc += b`
    JmpNot,
    /// `if R[a] == nil then pc += b`
    JmpNil,
    /// `pc += a`, running `ensure` handlers on the way out
    JmpUw,
    /// `R[a] = exc`
    Except,
    /// `R[b] = R[a].kind_of?(R[b])`
    Rescue,
    /// `raise(R[a]) if R[a]`
    RaiseIf,

    // =========================================================================
    // Calls
    // =========================================================================
    /// `R[a] = self.send(Syms[b], R[a+1]..)`, c = n | (nk << 4)
    SSend,
    /// Like `SSend` with a block in the last argument register.
    SSendB,
    /// `R[a] = R[a].send(Syms[b], R[a+1]..)`, c = n | (nk << 4)
    Send,
    SendB,
    Call,
    /// `R[a] = super(R[a+1]..)`, b = n | (nk << 4)
    Super,
    ArgAry,
    /// Argument spec check, a = 23-bit aspec
    Enter,
    KeyP,
    KeyEnd,
    KArg,
    Return,
    ReturnBlk,
    Break,
    /// `R[a] = block` (b = ainfo << 4 | lv)
    BlkPush,

    // =========================================================================
    // Arithmetic / Comparison (receiver in R[a], argument in R[a+1])
    // =========================================================================
    Add,
    /// `R[a] = R[a] + b`
    AddI,
    Sub,
    /// `R[a] = R[a] - b`
    SubI,
    Mul,
    Div,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,

    // =========================================================================
    // Collections
    // =========================================================================
    /// `R[a] = [R[a], .., R[a+b-1]]`
    Array,
    Array2,
    /// `R[a] = R[a] + R[a+1]`
    AryCat,
    /// `R[a].push(R[a+1]..R[a+b])`
    AryPush,
    ArySplat,
    ARef,
    ASet,
    APost,
    Intern,
    Symbol,
    /// `R[a] = str_dup(Pool[b])`
    String,
    /// `R[a] = R[a] + R[a+1]`
    StrCat,
    /// `R[a] = {R[a] => R[a+1], ..}` with b pairs
    Hash,
    HashAdd,
    HashCat,

    // =========================================================================
    // Definitions
    // =========================================================================
    Lambda,
    Block,
    Method,
    RangeInc,
    RangeExc,
    OClass,
    Class,
    Module,
    Exec,
    Def,
    Alias,
    Undef,
    SClass,
    TClass,
    Debug,
    /// `raise(LocalJumpError, Pool[a])`
    Err,

    // =========================================================================
    // Prefixes
    // =========================================================================
    Ext1,
    Ext2,
    Ext3,
    Stop,
}

impl OpCode {
    /// Decode an opcode byte.
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::try_from(byte).ok()
    }

    /// Operand layout.
    pub fn format(self) -> OperandFormat {
        use OpCode::*;
        use OperandFormat as F;
        match self {
            Nop | Call | KeyEnd | Ext1 | Ext2 | Ext3 | Stop => F::Z,
            LoadIMinus1 | LoadI0 | LoadI1 | LoadI2 | LoadI3 | LoadI4 | LoadI5 | LoadI6
            | LoadI7 | LoadNil | LoadSelf | LoadT | LoadF | GetIdx | SetIdx | Except
            | RaiseIf | Return | ReturnBlk | Break | Add | Sub | Mul | Div | Eq | Lt | Le
            | Gt | Ge | AryCat | ArySplat | Intern | StrCat | HashCat | RangeInc
            | RangeExc | OClass | Undef | SClass | TClass | Err => F::B,
            Move | LoadL | LoadI | LoadINeg | LoadSym | GetGv | SetGv | GetSv | SetSv
            | GetIv | SetIv | GetCv | SetCv | GetConst | SetConst | GetMcnst | SetMcnst
            | Rescue | Super | KeyP | KArg | AddI | SubI | Array | AryPush | Symbol
            | String | Hash | HashAdd | Lambda | Block | Method | Class | Module | Exec
            | Def | Alias => F::BB,
            GetUpvar | SetUpvar | SSend | SSendB | Send | SendB | Array2 | ARef | ASet
            | APost | Debug => F::BBB,
            JmpIf | JmpNot | JmpNil | ArgAry | BlkPush | LoadI16 => F::BS,
            LoadI32 => F::BSS,
            Jmp | JmpUw => F::S,
            Enter => F::W,
        }
    }

    /// Assembly mnemonic.
    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            Nop => "NOP",
            Move => "MOVE",
            LoadL => "LOADL",
            LoadI => "LOADI",
            LoadINeg => "LOADINEG",
            LoadIMinus1 => "LOADI__1",
            LoadI0 => "LOADI_0",
            LoadI1 => "LOADI_1",
            LoadI2 => "LOADI_2",
            LoadI3 => "LOADI_3",
            LoadI4 => "LOADI_4",
            LoadI5 => "LOADI_5",
            LoadI6 => "LOADI_6",
            LoadI7 => "LOADI_7",
            LoadI16 => "LOADI16",
            LoadI32 => "LOADI32",
            LoadSym => "LOADSYM",
            LoadNil => "LOADNIL",
            LoadSelf => "LOADSELF",
            LoadT => "LOADT",
            LoadF => "LOADF",
            GetGv => "GETGV",
            SetGv => "SETGV",
            GetSv => "GETSV",
            SetSv => "SETSV",
            GetIv => "GETIV",
            SetIv => "SETIV",
            GetCv => "GETCV",
            SetCv => "SETCV",
            GetConst => "GETCONST",
            SetConst => "SETCONST",
            GetMcnst => "GETMCNST",
            SetMcnst => "SETMCNST",
            GetUpvar => "GETUPVAR",
            SetUpvar => "SETUPVAR",
            GetIdx => "GETIDX",
            SetIdx => "SETIDX",
            Jmp => "JMP",
            JmpIf => "JMPIF",
            JmpNot => "JMPNOT",
            JmpNil => "JMPNIL",
            JmpUw => "JMPUW",
            Except => "EXCEPT",
            Rescue => "RESCUE",
            RaiseIf => "RAISEIF",
            SSend => "SSEND",
            SSendB => "SSENDB",
            Send => "SEND",
            SendB => "SENDB",
            Call => "CALL",
            Super => "SUPER",
            ArgAry => "ARGARY",
            Enter => "ENTER",
            KeyP => "KEY_P",
            KeyEnd => "KEYEND",
            KArg => "KARG",
            Return => "RETURN",
            ReturnBlk => "RETURN_BLK",
            Break => "BREAK",
            BlkPush => "BLKPUSH",
            Add => "ADD",
            AddI => "ADDI",
            Sub => "SUB",
            SubI => "SUBI",
            Mul => "MUL",
            Div => "DIV",
            Eq => "EQ",
            Lt => "LT",
            Le => "LE",
            Gt => "GT",
            Ge => "GE",
            Array => "ARRAY",
            Array2 => "ARRAY2",
            AryCat => "ARYCAT",
            AryPush => "ARYPUSH",
            ArySplat => "ARYSPLAT",
            ARef => "AREF",
            ASet => "ASET",
            APost => "APOST",
            Intern => "INTERN",
            Symbol => "SYMBOL",
            String => "STRING",
            StrCat => "STRCAT",
            Hash => "HASH",
            HashAdd => "HASHADD",
            HashCat => "HASHCAT",
            Lambda => "LAMBDA",
            Block => "BLOCK",
            Method => "METHOD",
            RangeInc => "RANGE_INC",
            RangeExc => "RANGE_EXC",
            OClass => "OCLASS",
            Class => "CLASS",
            Module => "MODULE",
            Exec => "EXEC",
            Def => "DEF",
            Alias => "ALIAS",
            Undef => "UNDEF",
            SClass => "SCLASS",
            TClass => "TCLASS",
            Debug => "DEBUG",
            Err => "ERR",
            Ext1 => "EXT1",
            Ext2 => "EXT2",
            Ext3 => "EXT3",
            Stop => "STOP",
        }
    }

    /// `LOADI_0`..`LOADI_7` for a small non-negative value.
    pub fn load_small_int(n: u8) -> Option<Self> {
        if n < 8 {
            Self::from_u8(OpCode::LoadI0 as u8 + n)
        } else {
            None
        }
    }

    /// Whether this is a conditional or unconditional relative jump.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jmp | OpCode::JmpIf | OpCode::JmpNot | OpCode::JmpNil | OpCode::JmpUw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_matches_binary_format() {
        assert_eq!(OpCode::Nop as u8, 0);
        assert_eq!(OpCode::LoadI0 as u8, 6);
        assert_eq!(OpCode::LoadI16 as u8, 14);
        assert_eq!(OpCode::Jmp as u8, 37);
        assert_eq!(OpCode::SSend as u8, 45);
        assert_eq!(OpCode::Enter as u8, 52);
        assert_eq!(OpCode::Add as u8, 60);
        assert_eq!(OpCode::Array as u8, 71);
        assert_eq!(OpCode::String as u8, 81);
        assert_eq!(OpCode::Err as u8, 101);
        assert_eq!(OpCode::Stop as u8, 105);
    }

    #[test]
    fn from_u8_rejects_unknown() {
        assert_eq!(OpCode::from_u8(1), Some(OpCode::Move));
        assert_eq!(OpCode::from_u8(106), None);
        assert_eq!(OpCode::from_u8(255), None);
    }

    #[test]
    fn base_sizes() {
        assert_eq!(OpCode::Nop.format().size(Ext::None), 1);
        assert_eq!(OpCode::Return.format().size(Ext::None), 2);
        assert_eq!(OpCode::Move.format().size(Ext::None), 3);
        assert_eq!(OpCode::Send.format().size(Ext::None), 4);
        assert_eq!(OpCode::JmpIf.format().size(Ext::None), 4);
        assert_eq!(OpCode::LoadI32.format().size(Ext::None), 6);
        assert_eq!(OpCode::Jmp.format().size(Ext::None), 3);
        assert_eq!(OpCode::Enter.format().size(Ext::None), 4);
    }

    #[test]
    fn extended_sizes() {
        let bb = OperandFormat::BB;
        assert_eq!(bb.size(Ext::Ext1), 4);
        assert_eq!(bb.size(Ext::Ext2), 4);
        assert_eq!(bb.size(Ext::Ext3), 5);
        assert_eq!(OperandFormat::B.size(Ext::Ext2), 2);
        assert_eq!(OperandFormat::BBB.size(Ext::Ext3), 6);
        assert_eq!(OperandFormat::BS.size(Ext::Ext1), 5);
        assert_eq!(OperandFormat::BSS.size(Ext::Ext3), 7);
    }

    #[test]
    fn small_int_loads() {
        assert_eq!(OpCode::load_small_int(0), Some(OpCode::LoadI0));
        assert_eq!(OpCode::load_small_int(7), Some(OpCode::LoadI7));
        assert_eq!(OpCode::load_small_int(8), None);
    }

    #[test]
    fn every_opcode_has_a_name() {
        for b in 0..=OpCode::Stop as u8 {
            let op = OpCode::from_u8(b).unwrap();
            assert!(!op.name().is_empty());
        }
    }
}
