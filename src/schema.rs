use crate::backend::Column;

/// Bumped whenever a table below changes shape. There are no migrations yet,
/// so a mismatch with the stored marker stops the server at startup.
pub const DB_VERSION: &str = "1";

pub const ACCOUNTS: &str = "accounts";
pub const SESSIONS: &str = "sessions";
pub const METADATA: &str = "metadata";
pub const MODPACK: &str = "modpack";
pub const SERVERS: &str = "servers";

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
}

const ITEM_COLUMNS: &[Column] = &[
    Column::text("project_id").primary(),
    Column::text("project_name"),
    Column::text("project_source"),
    Column::text("applied_versions"),
    Column::text("tags"),
];

pub const TABLES: &[Table] = &[
    Table {
        name: ACCOUNTS,
        columns: &[Column::text("username").primary(), Column::text("password_hash")],
    },
    Table {
        name: SESSIONS,
        columns: &[
            Column::text("token").primary(),
            Column::text("username"),
            Column::integer("expires"),
        ],
    },
    Table {
        name: METADATA,
        columns: &[Column::text("key").primary(), Column::text("value")],
    },
    Table {
        name: MODPACK,
        columns: &[
            Column::text("name"),
            Column::text("version"),
            Column::text("description"),
            Column::text("icon"),
        ],
    },
    Table {
        name: "mods",
        columns: ITEM_COLUMNS,
    },
    Table {
        name: "resource_packs",
        columns: ITEM_COLUMNS,
    },
    Table {
        name: "shader_packs",
        columns: ITEM_COLUMNS,
    },
    Table {
        name: "config_files",
        columns: ITEM_COLUMNS,
    },
    Table {
        name: SERVERS,
        columns: &[
            Column::text("id").primary(),
            Column::text("name"),
            Column::text("url"),
            Column::text("versions"),
        ],
    },
];
