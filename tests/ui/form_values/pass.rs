use calmform::form::{ToValueTree, Value};

#[derive(calmform::form::FormValues)]
struct Address {
    city: String,
    #[form(rename = "zip")]
    postal_code: Option<String>,
}

#[derive(calmform::form::FormValues)]
struct Signup {
    email: String,
    newsletter: bool,
    tags: Vec<String>,
    address: Address,
    #[form(skip)]
    #[allow(dead_code)]
    session: u64,
}

fn main() {
    let signup = Signup {
        email: "ada@example.com".to_string(),
        newsletter: true,
        tags: vec!["a".to_string(), "b".to_string()],
        address: Address {
            city: "Seattle".to_string(),
            postal_code: None,
        },
        session: 7,
    };

    let tree = signup.to_value_tree();
    assert_eq!(tree.get("email"), Some(&Value::from("ada@example.com")));
    assert_eq!(tree.get("newsletter"), Some(&Value::Bool(true)));
    assert_eq!(tree.get("address.city"), Some(&Value::from("Seattle")));
    assert_eq!(tree.get("address.zip"), None);
    assert_eq!(tree.get("session"), None);
    assert_eq!(
        tree.get("tags"),
        Some(&Value::List(vec!["a".into(), "b".into()]))
    );
}
