#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const MODE_COMMANDS: &[&str] = &["generate", "remix", "history"];

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "ratio",
    action: "set_aspect_ratio",
}];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "image",
    action: "set_input_image",
}];

pub(crate) const SINGLE_ID_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "reuse",
        action: "reuse",
    },
    CommandSpec {
        command: "delete",
        action: "delete",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "again",
        action: "resubmit",
    },
    CommandSpec {
        command: "clear",
        action: "clear_history",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const EXPORT_COMMAND: CommandSpec = CommandSpec {
    command: "export",
    action: "export",
};

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/generate",
    "/remix",
    "/history",
    "/ratio",
    "/image",
    "/reuse",
    "/delete",
    "/again",
    "/clear",
    "/export",
    "/help",
    "/quit",
];
