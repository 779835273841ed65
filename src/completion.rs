//! Zsh completion script

const ZSH_TEMPLATE: &str = r#"#compdef PROGRAM

local -a args

args+=(
    '(-e --encrypt -d --decrypt -s --sign -v --verify)'{-e,--encrypt}'[encrypt every file]'
    '(-e --encrypt -d --decrypt -s --sign -v --verify)'{-d,--decrypt}'[decrypt every .encrypt file]'
    '(-e --encrypt -d --decrypt -s --sign -v --verify)'{-s,--sign}'[write a detached signature for every file]'
    '(-e --encrypt -d --decrypt -s --sign -v --verify)'{-v,--verify}'[verify detached signatures]'
    {-t,--target}'[file or directory to process]:target:_files'
    {-k,--key}'[recipient or signer key]:key:'
    {-j,--jobs}'[files processed at once]:jobs:'
    '--gpg[program to run instead of gpg]:program:_command_names'
    '*--gpg-arg[extra argument passed to gpg]:argument:'
    {-q,--quiet}'[only report failures]'
    '--completion-script[print this zsh completion script]'
)

_arguments -s $args
"#;

/// The zsh completion script for a binary installed as `program`.
pub fn zsh_script(program: &str) -> String {
    ZSH_TEMPLATE.replace("PROGRAM", program)
}
