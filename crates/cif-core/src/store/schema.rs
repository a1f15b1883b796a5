//! DDL for the relational schema backing one CIF [`Document`](crate::Document).
//!
//! The identifying keys and constraints here are the mandatory part of
//! spec §4.1; everything else (column order, index names) is free to vary.
//! The scalar-loop-uniqueness trigger raises the literal message
//! [`crate::error::DUPLICATE_SCALAR_LOOP_MARKER`], which the core matches on
//! to distinguish it from any other constraint violation.

pub const DDL: &str = r#"
CREATE TABLE container (
    id INTEGER PRIMARY KEY AUTOINCREMENT
);

CREATE TABLE data_block (
    container_id INTEGER PRIMARY KEY REFERENCES container(id) ON DELETE CASCADE,
    name TEXT NOT NULL UNIQUE,
    name_orig TEXT NOT NULL
);

CREATE TABLE save_frame (
    container_id INTEGER PRIMARY KEY REFERENCES container(id) ON DELETE CASCADE,
    data_block_id INTEGER NOT NULL REFERENCES container(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    name_orig TEXT NOT NULL,
    UNIQUE (data_block_id, name)
);

CREATE TABLE loop (
    container_id INTEGER NOT NULL REFERENCES container(id) ON DELETE CASCADE,
    category TEXT NOT NULL,
    loop_num INTEGER NOT NULL,
    PRIMARY KEY (container_id, loop_num)
);

-- At most one loop per container may have the reserved scalar category.
CREATE TRIGGER loop_scalar_unique
BEFORE INSERT ON loop
WHEN NEW.category = ''
 AND EXISTS (
    SELECT 1 FROM loop WHERE container_id = NEW.container_id AND category = ''
 )
BEGIN
    SELECT RAISE(ABORT, 'duplicate scalar loop');
END;

CREATE TABLE loop_item (
    container_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    name_orig TEXT NOT NULL,
    loop_num INTEGER NOT NULL,
    PRIMARY KEY (container_id, name),
    FOREIGN KEY (container_id, loop_num) REFERENCES loop(container_id, loop_num) ON DELETE CASCADE
);

CREATE TABLE item_value (
    container_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    row_num INTEGER NOT NULL,
    kind INTEGER NOT NULL,
    val TEXT,
    val_text TEXT,
    val_digits TEXT,
    su_digits TEXT,
    scale INTEGER,
    sign INTEGER,
    PRIMARY KEY (container_id, name, row_num),
    FOREIGN KEY (container_id, name) REFERENCES loop_item(container_id, name) ON DELETE CASCADE
);
"#;
