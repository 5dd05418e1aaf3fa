use pretty_assertions::assert_eq;
use protolift_core::proto::{self, descriptor};
use protolift_core::schema::{FieldType, Scalar, TopLevel};
use protolift_core::{Error, LuaSourceLoader, ProtoReconstructor, ReconstructorConfig};
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

const ENUMS: &str = r#"-- Generated By protoc-gen-lua Do not Edit
local protobuf = require "protobuf/protobuf"
local Enums_pbTable = {}

Enums_pbTable.COLOR = protobuf.EnumDescriptor();
Enums_pbTable.COLOR_RED_ENUM = protobuf.EnumValueDescriptor();
Enums_pbTable.COLOR_GREEN_ENUM = protobuf.EnumValueDescriptor();

Enums_pbTable.COLOR_RED_ENUM.name = "RED"
Enums_pbTable.COLOR_RED_ENUM.index = 0
Enums_pbTable.COLOR_RED_ENUM.number = 1
Enums_pbTable.COLOR_GREEN_ENUM.name = "GREEN"
Enums_pbTable.COLOR_GREEN_ENUM.index = 1
Enums_pbTable.COLOR_GREEN_ENUM.number = -(2)
Enums_pbTable.COLOR.name = "Color"
Enums_pbTable.COLOR.full_name = ".game.Color"
Enums_pbTable.COLOR.values = {Enums_pbTable.COLOR_RED_ENUM, Enums_pbTable.COLOR_GREEN_ENUM}

return Enums_pbTable
"#;

const PLAYER: &str = r#"-- Generated By protoc-gen-lua Do not Edit
local protobuf = require "protobuf/protobuf"
local enums_pb = require("protos.enums_pb")
local Player_pbTable = {}

Player_pbTable.PLAYER = protobuf.Descriptor();
Player_pbTable.PLAYER_NAME_FIELD = protobuf.FieldDescriptor();
Player_pbTable.PLAYER_ID_FIELD = protobuf.FieldDescriptor();
Player_pbTable.PLAYER_COLOR_FIELD = protobuf.FieldDescriptor();
Player_pbTable.PLAYER_SCORES_FIELD = protobuf.FieldDescriptor();
Player_pbTable.PLAYER_GUILD_FIELD = protobuf.FieldDescriptor();
Player_pbTable.GUILD = protobuf.Descriptor();
Player_pbTable.GUILD_TAG_FIELD = protobuf.FieldDescriptor();

Player_pbTable.PLAYER_NAME_FIELD.name = "name"
Player_pbTable.PLAYER_NAME_FIELD.full_name = ".game.Player.name"
Player_pbTable.PLAYER_NAME_FIELD.number = 2
Player_pbTable.PLAYER_NAME_FIELD.index = 0
Player_pbTable.PLAYER_NAME_FIELD.label = 1
Player_pbTable.PLAYER_NAME_FIELD.has_default_value = false
Player_pbTable.PLAYER_NAME_FIELD.default_value = ""
Player_pbTable.PLAYER_NAME_FIELD.type = 9
Player_pbTable.PLAYER_NAME_FIELD.cpp_type = 9

Player_pbTable.PLAYER_ID_FIELD.name = "id"
Player_pbTable.PLAYER_ID_FIELD.number = 1
Player_pbTable.PLAYER_ID_FIELD.label = 2
Player_pbTable.PLAYER_ID_FIELD.type = 4

Player_pbTable.PLAYER_COLOR_FIELD.name = "color"
Player_pbTable.PLAYER_COLOR_FIELD.number = 3
Player_pbTable.PLAYER_COLOR_FIELD.label = 1
Player_pbTable.PLAYER_COLOR_FIELD.enum_type = enums_pb.COLOR
Player_pbTable.PLAYER_COLOR_FIELD.type = 14

Player_pbTable.PLAYER_SCORES_FIELD.name = "scores"
Player_pbTable.PLAYER_SCORES_FIELD.number = 4
Player_pbTable.PLAYER_SCORES_FIELD.label = 3
Player_pbTable.PLAYER_SCORES_FIELD.type = 17

Player_pbTable.PLAYER_GUILD_FIELD.name = "guild"
Player_pbTable.PLAYER_GUILD_FIELD.number = 5
Player_pbTable.PLAYER_GUILD_FIELD.label = 1
Player_pbTable.PLAYER_GUILD_FIELD.message_type = Player_pbTable.GUILD
Player_pbTable.PLAYER_GUILD_FIELD.type = 11

Player_pbTable.PLAYER.name = "Player"
Player_pbTable.PLAYER.full_name = ".game.Player"
Player_pbTable.PLAYER.nested_types = {}
Player_pbTable.PLAYER.enum_types = {}
Player_pbTable.PLAYER.fields = {Player_pbTable.PLAYER_NAME_FIELD, Player_pbTable.PLAYER_ID_FIELD, Player_pbTable.PLAYER_COLOR_FIELD, Player_pbTable.PLAYER_SCORES_FIELD, Player_pbTable.PLAYER_GUILD_FIELD}
Player_pbTable.PLAYER.is_extendable = false
Player_pbTable.PLAYER.extensions = {}

Player_pbTable.GUILD_TAG_FIELD.name = "tag"
Player_pbTable.GUILD_TAG_FIELD.number = 1
Player_pbTable.GUILD_TAG_FIELD.label = 1
Player_pbTable.GUILD_TAG_FIELD.type = 12

Player_pbTable.GUILD.name = "Guild"
Player_pbTable.GUILD.full_name = ".game.Guild"
Player_pbTable.GUILD.fields = {Player_pbTable.GUILD_TAG_FIELD}

Player = protobuf.Message(Player_pbTable.PLAYER)
Guild = protobuf.Message(Player_pbTable.GUILD)

return Player_pbTable
"#;

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("enums_pb.lua"), ENUMS).unwrap();
    fs::write(dir.path().join("player_pb.lua"), PLAYER).unwrap();
    fs::write(dir.path().join("README.txt"), "ignored").unwrap();
    dir
}

#[test]
fn reconstructs_module_graph_from_directory() {
    let dir = fixture();
    let loader = LuaSourceLoader::load(dir.path()).unwrap();
    let mut session = ProtoReconstructor::new(&loader);

    let player = session.reconstruct("player_pb").unwrap();
    let enums = session.file("enums_pb").unwrap();

    assert_eq!(player.imports(), ["Enums.proto"]);
    assert_eq!(session.files().len(), 2);
    assert!(Rc::ptr_eq(&session.files()[0], &enums));
    assert!(session.diagnostics().is_empty());

    let expected = "\
// Reconstructed by protolift
// Source: player_pb.lua

syntax = \"proto2\";

import \"Enums.proto\";

package game;

message Player {
  required uint64 id = 1;
  optional string name = 2;
  optional Color color = 3;
  repeated sint32 scores = 4;
  optional Guild guild = 5;
}

message Guild {
  optional bytes tag = 1;
}
";
    assert_eq!(proto::render(&player), expected);

    let expected = "\
// Reconstructed by protolift
// Source: enums_pb.lua

syntax = \"proto2\";

package game;

enum Color {
  RED = 1;
  GREEN = -2;
}
";
    assert_eq!(proto::render(&enums), expected);
}

#[test]
fn skip_enums_types_enum_fields_as_int32() {
    let dir = fixture();
    let loader = LuaSourceLoader::load(dir.path()).unwrap();
    let config = ReconstructorConfig::new().skip_enums(true);
    let mut session = ProtoReconstructor::new(&loader).with_config(config);

    let player = session.reconstruct("player_pb").unwrap();
    let Some(TopLevel::Message(message)) = player.entries().first() else {
        panic!("expected Player message");
    };
    assert_eq!(message.field(3).unwrap().field_type, FieldType::scalar(Scalar::Int32));
    // The import is still recorded
    assert_eq!(player.imports(), ["Enums.proto"]);
}

#[test]
fn descriptor_set_round_trips_numbers_and_types() {
    let dir = fixture();
    let loader = LuaSourceLoader::load(dir.path()).unwrap();
    let mut session = ProtoReconstructor::new(&loader);
    session.reconstruct("player_pb").unwrap();

    let pool = descriptor::descriptor_pool(session.files()).unwrap();
    let player = pool.get_message_by_name("game.Player").unwrap();

    let fields: Vec<_> = player.fields().map(|f| (f.name().to_string(), f.number())).collect();
    assert_eq!(
        fields,
        vec![
            ("id".to_string(), 1),
            ("name".to_string(), 2),
            ("color".to_string(), 3),
            ("scores".to_string(), 4),
            ("guild".to_string(), 5),
        ]
    );
    assert!(player.get_field_by_name("scores").unwrap().is_list());

    let color = pool.get_enum_by_name("game.Color").unwrap();
    assert_eq!(color.get_value_by_name("GREEN").map(|v| v.number()), Some(-2));
}

#[test]
fn missing_import_fails_the_importer_only() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("player_pb.lua"), PLAYER).unwrap();
    let loader = LuaSourceLoader::load(dir.path()).unwrap();
    let mut session = ProtoReconstructor::new(&loader);

    let err = session.reconstruct("player_pb").unwrap_err();
    assert!(matches!(err, Error::ModuleNotFound { .. }));
    assert!(err.is_recoverable());
    assert!(session.files().is_empty());
    assert!(session.file("player_pb").is_none());
}
