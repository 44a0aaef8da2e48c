//! Translates legacy shader assembly into fixed-function GL ES 1.1 commands.
//!
//! [`compile_file`]/[`compile_string`] run the whole front end from
//! `shaderasm` and hand the validated program to [`translate`]. The resulting
//! [`CommandList`] is backend-agnostic; [`dispatch`] applies one command to a
//! [`Backend`] after checking the capability it needs.
mod backend;
mod command;
mod compile;
mod translate;

pub use backend::{
    capability, dispatch, required_capability, Backend, BackendError, DispatchError, NullBackend,
};
pub use command::{gl, Command, CommandKind, CommandList, Payload};
pub use compile::{
    compile_file, compile_string, load_program, load_program_at, CompileError, CompileOptions,
};
pub use translate::{
    translate, translate_constant, translate_instruction, CombineOp, Diagnostic, Modifier, Opcode,
    TranslateError, Translation, MAX_COLOR_OUTPUT, MAX_TEXCOORD_OUTPUT, MAX_TEXTURE_STAGE,
};
