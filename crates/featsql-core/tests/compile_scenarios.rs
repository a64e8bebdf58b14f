//! End-to-end compilation of mappings into query SQL and write statements.

use featsql_core::mapping::{RelationKind, RelationTreeDeriver, TableArena};
use featsql_core::mutation::{MutationCompiler, MutationRunner, StatementKind, ValueContainer};
use featsql_core::proto::{FeatureQuery, FilterExpr, MutationKind, SortKey, ValueOp};
use featsql_core::sql::{GeoPackage, PostGis, QueryTemplates, QueryWindow};
use featsql_core::{DialectKind, FeatureTypeMapping, PropertyMapping, PropertyRole, ProviderConfig};
use pretty_assertions::assert_eq;

fn parcels() -> FeatureTypeMapping {
    FeatureTypeMapping::new("parcels", "parcel")
        .with_property(PropertyMapping::new("id", "id").with_role(PropertyRole::Id))
        .with_property(PropertyMapping::new("name", "name"))
        .with_property(PropertyMapping::new("city", "[id=parcel_id]address/city"))
        .with_property(PropertyMapping::new(
            "phone",
            "[id=parcel_id]address/[id=address_id]phone/number",
        ))
}

#[test]
fn test_every_derived_table_has_a_relation_path() {
    let root = RelationTreeDeriver::derive_mapping(&parcels()).unwrap();
    let tables = root.tables();
    assert_eq!(
        tables.iter().filter(|t| t.kind() == RelationKind::None).count(),
        1
    );
    for table in tables.iter().filter(|t| !t.is_root()) {
        assert!(!table.relation_path.is_empty(), "{}", table.path);
    }

    let arena = TableArena::new(&root);
    assert_eq!(arena.len(), tables.len());
}

#[test]
fn test_paged_query_with_one_to_many_child() {
    let mapping = FeatureTypeMapping::new("parcels", "parcel")
        .with_property(PropertyMapping::new("city", "[id=parcel_id]address/city"));
    let templates = QueryTemplates::from_mapping(&mapping, &ProviderConfig::new()).unwrap();
    let window = QueryWindow::new(10, 20);

    let meta = templates.meta_query(&window).unwrap();
    assert!(meta.starts_with(
        "WITH NR AS (SELECT MIN(SKEY) AS minKey, MAX(SKEY) AS maxKey, count(*) AS numberReturned FROM (SELECT A.id AS SKEY FROM parcel A ORDER BY SKEY LIMIT 10 OFFSET 20) AS IDS)"
    ));

    let queries = templates.value_queries(&window).unwrap();
    assert_eq!(
        queries.last().unwrap(),
        "SELECT A.id AS SKEY, B.id AS SKEY_1, B.city FROM parcel A JOIN address B ON (A.id=B.parcel_id) ORDER BY 1,2"
    );
}

#[test]
fn test_doubly_nested_group_sorts_by_every_chain_table() {
    let templates = QueryTemplates::from_mapping(&parcels(), &ProviderConfig::new()).unwrap();
    let queries = templates.value_queries(&QueryWindow::new(0, 0)).unwrap();
    assert_eq!(queries.len(), 3);
    assert_eq!(
        queries[2],
        "SELECT A.id AS SKEY, B.id AS SKEY_1, C.id AS SKEY_2, C.number FROM parcel A JOIN address B ON (A.id=B.parcel_id) JOIN phone C ON (B.id=C.address_id) ORDER BY 1,2,3"
    );
}

#[test]
fn test_compiling_twice_is_byte_identical() {
    let config = ProviderConfig::new().with_dialect(DialectKind::GeoPackage);
    let first = QueryTemplates::from_mapping(&parcels(), &config).unwrap();
    let second = QueryTemplates::from_mapping(&parcels(), &config).unwrap();

    let keys = vec![SortKey::desc("name")];
    let filter = FilterExpr::or(vec![
        FilterExpr::eq("city", "Bonn"),
        FilterExpr::like("name", "Lot%"),
    ]);
    let window = QueryWindow::new(25, 50)
        .with_sort_keys(&keys)
        .with_filter(Some(&filter));

    assert_eq!(
        first.meta_query(&window).unwrap(),
        second.meta_query(&window).unwrap()
    );
    assert_eq!(
        first.value_queries(&window).unwrap(),
        second.value_queries(&window).unwrap()
    );
}

#[test]
fn test_identifier_lookup_has_no_key_bracket() {
    let templates = QueryTemplates::from_mapping(&parcels(), &ProviderConfig::new()).unwrap();
    let query = FeatureQuery::by_id("parcels", "42");
    let filter = query.effective_filter();
    let window = QueryWindow::new(1, 0)
        .with_filter(filter.as_ref())
        .with_id_lookup(true);
    for sql in templates.value_queries(&window).unwrap() {
        assert!(sql.contains("WHERE A.id IN ('42')"), "{}", sql);
        assert!(!sql.contains(">="), "{}", sql);
    }
}

#[test]
fn test_delete_is_one_statement() {
    let root = RelationTreeDeriver::derive_mapping(&parcels()).unwrap();
    let values = ValueContainer::new(&root);
    let statements = MutationCompiler::new(&root, &PostGis)
        .compile(&MutationKind::Delete { id: "42".into() }, &values)
        .unwrap();
    assert_eq!(
        MutationRunner::dry_run(&statements).unwrap(),
        vec!["DELETE FROM parcel WHERE id=42 RETURNING id"]
    );
}

#[test]
fn test_update_with_many_to_many_child() {
    let tag = "parcel/[id=parcel_id]parcel_2_tag/[tag_id=id]tag";
    let root = RelationTreeDeriver::derive_paths(&["parcel/name", &format!("{}/label", tag)]).unwrap();

    let mut values = ValueContainer::new(&root);
    values
        .apply(&[
            ValueOp::value("parcel/name", "name", "Lot 7"),
            ValueOp::row(tag),
            ValueOp::value(format!("{}/label", tag), "label", "red"),
        ])
        .unwrap();

    let statements = MutationCompiler::new(&root, &GeoPackage)
        .compile(&MutationKind::Update { id: "9".into() }, &values)
        .unwrap();
    let kinds: Vec<StatementKind> = statements.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StatementKind::Delete,
            StatementKind::Insert,
            StatementKind::Insert,
            StatementKind::JunctionInsert,
        ]
    );
    assert_eq!(
        MutationRunner::dry_run(&statements).unwrap(),
        vec![
            "DELETE FROM parcel WHERE id=9 RETURNING id",
            "INSERT INTO parcel (id,name) VALUES (9,'Lot 7') RETURNING id",
            "INSERT INTO tag (label) VALUES ('red') RETURNING id",
            "INSERT INTO parcel_2_tag (parcel_id,tag_id) VALUES (9,1)",
        ]
    );
}

#[test]
fn test_staged_rows_survive_compilation() {
    let root = RelationTreeDeriver::derive_mapping(&parcels()).unwrap();
    let address = "parcel/[id=parcel_id]address";
    let phone = "parcel/[id=parcel_id]address/[id=address_id]phone";

    let mut values = ValueContainer::new(&root);
    values
        .apply(&[
            ValueOp::row(address),
            ValueOp::value(format!("{}/city", address), "city", "Bonn"),
            ValueOp::row(phone),
            ValueOp::value(format!("{}/number", phone), "number", "1"),
            ValueOp::row(phone),
            ValueOp::value(format!("{}/number", phone), "number", "2"),
            ValueOp::row(address),
            ValueOp::null(format!("{}/city", address), "city"),
        ])
        .unwrap();
    assert_eq!(values.row_count(address, 0).unwrap(), 2);
    assert_eq!(values.row_count(phone, 0).unwrap(), 2);
    assert_eq!(values.row_count(phone, 1).unwrap(), 0);

    let statements = MutationCompiler::new(&root, &PostGis)
        .compile(&MutationKind::Create, &values)
        .unwrap();
    assert_eq!(
        MutationRunner::dry_run(&statements).unwrap(),
        vec![
            "INSERT INTO parcel DEFAULT VALUES RETURNING id",
            "INSERT INTO address (parcel_id,city) VALUES (1,'Bonn') RETURNING id",
            "INSERT INTO phone (address_id,number) VALUES (2,'1') RETURNING id",
            "INSERT INTO phone (address_id,number) VALUES (2,'2') RETURNING id",
            "INSERT INTO address (parcel_id,city) VALUES (1,NULL) RETURNING id",
        ]
    );
}
