mod git_ops;
mod tool_list;

pub use git_ops::{clone_command, download_command, is_git_checkout, pull_command, GIST_HOST};
pub use tool_list::{
    add_tool, load_tool_list, parse_tool_list, ToolList, ToolSource, ToolSourceKind,
    TOOL_LIST_HEADER,
};

#[cfg(test)]
mod tests;
