//! Field tables for the four Archon resource types.

use crate::{Check, Field, ResourceSchema};

const METADATA: &[Field] = &[
    Field::string("name").computed().force_new().check(Check::Subdomain),
    Field::string("generate_name").force_new().check(Check::NamePrefix),
    Field::string("namespace").force_new().default_str("default").check(Check::Label),
    Field::string_map("labels").check(Check::LabelMap),
    Field::string_map("annotations").check(Check::AnnotationMap),
    Field::int("generation").read_only(),
    Field::string("resource_version").read_only(),
    Field::string("self_link").read_only(),
    Field::string("uid").read_only(),
];

const LOCAL_OBJECT_REFERENCE: &[Field] = &[Field::string("name").required()];

const FILE: &[Field] = &[
    Field::string("name"),
    Field::string("encoding"),
    Field::string("content"),
    Field::string("template"),
    Field::string("owner"),
    Field::int("user_id"),
    Field::int("group_id"),
    Field::string("filesystem"),
    Field::string("path"),
    Field::string("raw_file_permissions"),
];

const CONFIG: &[Field] = &[
    Field::string("name").required(),
    Field::string_map("data").check(Check::AnnotationMap),
];

const INSTANCE_SPEC: &[Field] = &[
    Field::string("os").required(),
    Field::string("image"),
    Field::string("instance_type"),
    Field::string("network_name").required(),
    Field::string("reclaim_policy").computed(),
    Field::block_list("files", FILE),
    Field::block_list("secrets", LOCAL_OBJECT_REFERENCE),
    Field::block_list("configs", CONFIG),
    Field::block_list("users", LOCAL_OBJECT_REFERENCE),
    Field::string("hostname"),
    Field::block("reserved_instance_ref", LOCAL_OBJECT_REFERENCE),
];

const SELECTOR_REQUIREMENT: &[Field] = &[
    Field::string("key").force_new(),
    Field::string("operator").force_new(),
    Field::string_set("values").force_new(),
];

const LABEL_SELECTOR: &[Field] = &[
    Field::block_list("match_expressions", SELECTOR_REQUIREMENT).force_new(),
    Field::string_map("match_labels").force_new().check(Check::LabelMap),
];

const SECRET: &[Field] = &[
    Field::block("metadata", METADATA),
    Field::string_map("data").sensitive(),
    Field::string("type").force_new().default_str("Opaque"),
];

const INSTANCE_TEMPLATE: &[Field] = &[
    Field::block("metadata", METADATA),
    Field::block("spec", INSTANCE_SPEC).required().force_new(),
    Field::block_list("secrets", SECRET).force_new(),
];

const INSTANCE_GROUP_SPEC: &[Field] = &[
    Field::int("replicas").required(),
    Field::string("provision_policy").force_new().default_str("DynamicOnly"),
    Field::block("selector", LABEL_SELECTOR).force_new(),
    Field::block("reserved_instance_selector", LABEL_SELECTOR).force_new(),
    Field::block("template", INSTANCE_TEMPLATE).required().force_new(),
];

const NETWORK_SPEC: &[Field] = &[
    Field::string("region").force_new(),
    Field::string("zone").force_new(),
    Field::string("subnet").force_new(),
];

const USER_SPEC: &[Field] = &[
    Field::string("name"),
    Field::string("password_hash").sensitive(),
    Field::string_set("ssh_authorized_keys"),
    Field::string("sudo"),
    Field::string("shell"),
];

pub static INSTANCE: ResourceSchema = ResourceSchema {
    type_name: "archon_instance",
    kind: "Instance",
    fields: &[
        Field::block("metadata", METADATA).required(),
        Field::block("spec", INSTANCE_SPEC).required().force_new(),
    ],
};

pub static INSTANCE_GROUP: ResourceSchema = ResourceSchema {
    type_name: "archon_instancegroup",
    kind: "InstanceGroup",
    fields: &[
        Field::block("metadata", METADATA).required(),
        Field::block("spec", INSTANCE_GROUP_SPEC).required(),
    ],
};

pub static NETWORK: ResourceSchema = ResourceSchema {
    type_name: "archon_network",
    kind: "Network",
    fields: &[
        Field::block("metadata", METADATA).required(),
        Field::block("spec", NETWORK_SPEC).required(),
    ],
};

pub static USER: ResourceSchema = ResourceSchema {
    type_name: "archon_user",
    kind: "User",
    fields: &[
        Field::block("metadata", METADATA).required(),
        Field::block("spec", USER_SPEC).required(),
    ],
};
