use phu_core::session::FormSession;
use phu_core::template::{FormTemplate, TemplateRegistry};
use phu_core::validate::{INVALID_IP, INVALID_VLAN};
use phu_core::{FieldId, PortCatalog, Site, SiteType, Store};
use tempfile::tempdir;

fn open(id: &str) -> FormSession {
    let registry = TemplateRegistry::builtin().unwrap();
    FormSession::new(registry.require(id).unwrap().clone(), PortCatalog::builtin().unwrap())
}

fn wire(session: &FormSession, name: &str) -> String {
    session
        .form_data()
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
        .unwrap_or_else(|| panic!("no field {name}"))
}

fn set(session: &mut FormSession, name: &str, value: &str) {
    let id = session
        .resolve(name)
        .unwrap_or_else(|| panic!("no field {name}"));
    session.set_value(&id, value).unwrap();
}

#[test]
fn dual_site_provisioning_walkthrough() {
    let mut form = open("oh_srx");
    form.generate(Some(SiteType::Dual), Some(3)).unwrap();

    set(&mut form, "deviceType", "SRX345");
    set(&mut form, "nmsVlan", "1232");
    set(&mut form, "serviceVlan1", "200");
    set(&mut form, "serviceVlanBackup1", "300");
    set(&mut form, "serviceClci2", "51-KXGS-000123");
    set(&mut form, "serviceIpsla3", "2.10");
    set(&mut form, "serviceCpePort1", "ge-0/0/7");

    assert_eq!(wire(&form, "vpnVlan"), "1233");
    assert_eq!(wire(&form, "serviceVlan3"), "202");
    assert_eq!(wire(&form, "serviceVlanBackup3"), "302");
    assert_eq!(wire(&form, "serviceClciBackup2"), "51-KXGS-000123:B");
    assert_eq!(wire(&form, "serviceIpslaBackup3"), "3.10");
    assert_eq!(wire(&form, "serviceCpePortBackup1"), "ge-5/0/7");

    let data = form.form_data();
    assert_eq!(data[0], ("circuitType".to_string(), "oh_srx".to_string()));
    assert_eq!(data[1], ("siteType".to_string(), "dual".to_string()));
    assert_eq!(data[2], ("numServices".to_string(), "3".to_string()));
    let first_backup = data.iter().position(|(k, _)| k.contains("Backup1")).unwrap();
    let last_primary = data.iter().rposition(|(k, _)| k == "serviceGateway3").unwrap();
    assert!(last_primary < first_backup);
}

#[test]
fn regenerating_n_m_n_matches_a_fresh_form() {
    let mut fresh = open("oh_srx");
    fresh.generate(Some(SiteType::Dual), Some(2)).unwrap();

    let mut form = open("oh_srx");
    form.generate(Some(SiteType::Dual), Some(2)).unwrap();
    set(&mut form, "serviceVlan1", "10");
    set(&mut form, "serviceGateway2", "not-an-ip");
    form.generate(Some(SiteType::Dual), Some(6)).unwrap();
    form.generate(Some(SiteType::Dual), Some(2)).unwrap();

    for site in [Site::Primary, Site::Backup] {
        assert_eq!(form.blocks(site), fresh.blocks(site));
    }
    assert!(form.annotations().is_empty());
    assert_eq!(form.progress(), fresh.progress());
}

#[test]
fn switching_to_single_site_drops_backup_data() {
    let mut form = open("oh_srx");
    form.generate(Some(SiteType::Dual), Some(2)).unwrap();
    set(&mut form, "nmsVlanBackup", "40");
    form.generate(Some(SiteType::Single), Some(2)).unwrap();

    assert!(form.blocks(Site::Backup).is_empty());
    assert!(form.resolve("nmsVlanBackup").is_none());
    assert!(form.form_data().iter().all(|(k, _)| !k.contains("Backup")));
}

#[test]
fn every_port_claimed_at_most_once() {
    let mut form = open("oh_srx");
    form.generate(Some(SiteType::Single), Some(4)).unwrap();
    set(&mut form, "deviceType", "SRX300");

    let port = |i: usize| FieldId::service(Site::Primary, i, "serviceCpePort");
    form.set_value(&port(1), "ge-0/0/2").unwrap();
    form.set_value(&port(2), "ge-0/0/3").unwrap();
    assert!(form.set_value(&port(3), "ge-0/0/2").is_err());
    form.set_value(&port(2), "ge-0/0/2").unwrap_err();
    form.set_value(&port(1), "ge-0/0/4").unwrap();
    form.set_value(&port(3), "ge-0/0/2").unwrap();

    for pool in form.tracker().pools() {
        let mut values: Vec<&str> = pool.claims().map(|(_, v)| v).collect();
        let before = values.len();
        values.sort();
        values.dedup();
        assert_eq!(values.len(), before);
    }
    let at_four = form.options(&port(4)).unwrap();
    let disabled: Vec<&str> = at_four
        .iter()
        .filter(|o| o.disabled)
        .map(|o| o.value.as_str())
        .collect();
    assert_eq!(disabled, vec!["ge-0/0/2", "ge-0/0/3", "ge-0/0/4"]);
}

#[test]
fn invalid_values_annotate_and_clear() {
    let mut form = open("oh_srx");
    form.generate(Some(SiteType::Single), Some(1)).unwrap();

    set(&mut form, "nmsVlan", "4094");
    set(&mut form, "nmsIp", "300.1.1.1");
    let nms_vlan = FieldId::standalone("nmsVlan");
    assert_eq!(form.annotations().get(&nms_vlan), Some(INVALID_VLAN));
    assert_eq!(
        form.annotations().get(&FieldId::standalone("nmsIp")),
        Some(INVALID_IP)
    );
    // 4095 derived into vpnVlan is annotated as well.
    assert_eq!(form.annotations().len(), 3);

    set(&mut form, "nmsVlan", "100");
    set(&mut form, "nmsIp", "10.20.30.40");
    assert!(form.annotations().is_empty());
}

#[test]
fn user_template_overrides_builtin() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path());
    let mut custom: FormTemplate = TemplateRegistry::builtin()
        .unwrap()
        .require("oh_decom")
        .unwrap()
        .clone();
    custom.title = "Lab Decom".to_string();
    store.write_template(&custom).unwrap();
    std::fs::write(store.templates_dir().join("broken.json"), "{").unwrap();

    let registry = TemplateRegistry::load(&store).unwrap();
    assert_eq!(registry.require("oh_decom").unwrap().title, "Lab Decom");
    assert!(registry.get("broken").is_none());
    assert!(registry.get("oh_srx").is_some());
}
